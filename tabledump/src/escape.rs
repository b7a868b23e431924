//! Escaping of arbitrary bytes for single-line display.
//!
//! Printable ASCII passes through unchanged, with the exception of backslash, which becomes `\\`.
//! Every other byte becomes `\xHH` with uppercase hex digits.  Because a backslash in the output
//! always starts an escape, the rendering is unambiguous.

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Append the escaped form of `bytes` to `out`.
pub fn append_escaped(out: &mut String, bytes: &[u8]) {
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b' '..=b'~' => out.push(b as char),
            _ => {
                out.push_str("\\x");
                out.push(HEX[(b >> 4) as usize] as char);
                out.push(HEX[(b & 0xf) as usize] as char);
            }
        }
    }
}

/// Return the escaped form of `bytes`.
pub fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    append_escaped(&mut out, bytes);
    out
}

/// Append the decimal form of `x` to `out`.
pub fn append_number(out: &mut String, x: u64) {
    out.push_str(&x.to_string());
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
