use serde::Serialize;

/// Prefix of the JSONP callback the endpoint wraps its payload in.
pub const CALLBACK_PREFIX: &str = "tvprogramen";

/// Per-request token the endpoint checks against (date, channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSignature {
    pub date: String,
    pub channel: String,
    pub code_name: String,
    pub code: i64,
}

impl RequestSignature {
    pub fn callback(&self) -> String {
        format!("{}{}", CALLBACK_PREFIX, self.code_name)
    }
}

/// Derive the signature for one (date, channel) pair.
///
/// Character codes are UTF-16 code units, which is what the endpoint's own
/// client uses; for the ASCII dates and channel ids seen in practice this is
/// the same as the byte value.
pub fn generate(date: &str, channel: &str) -> RequestSignature {
    let base: Vec<u16> = format!("{date}{channel}4").encode_utf16().collect();

    let mut aux = format!("{channel}{date}");
    if aux.is_empty() { aux.push_str("none"); }
    let char_sum: i64 = aux.encode_utf16().map(i64::from).sum();
    let c = 4 + char_sum;

    let mut b: i64 = 2;
    for i in (1..base.len()).rev() {
        b += (i64::from(base[i]) + c * 2) * i as i64;
    }

    let digits = b.to_string();
    let last = digits.chars().last().unwrap_or('0');
    RequestSignature {
        date: date.to_string(),
        channel: channel.to_string(),
        code_name: format!("b{last}"),
        code: b,
    }
}
