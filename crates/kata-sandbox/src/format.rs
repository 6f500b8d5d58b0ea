//! JavaScript number semantics: formatting, parsing and the operators whose
//! IEEE results differ from JavaScript's.

use crate::fault::Fault;

/// `String(n)`: shortest round-trip digits laid out the way JavaScript does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        // Covers -0.
        return "0".to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    // `{:e}` yields the shortest digits that round-trip, e.g. `1.2345e3`.
    let sci = format!("{:e}", n.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    // Position of the decimal point relative to the digits.
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let (first, rest) = digits.split_at(1);
        let exp_sign = if point - 1 < 0 { "-" } else { "+" };
        let exp = (point - 1).abs();
        if rest.is_empty() {
            format!("{first}e{exp_sign}{exp}")
        } else {
            format!("{first}.{rest}e{exp_sign}{exp}")
        }
    };
    format!("{sign}{body}")
}

/// `n.toFixed(digits)`.
pub fn to_fixed(n: f64, digits: f64) -> Result<String, Fault> {
    let digits = to_integer(digits);
    if !(0.0..=100.0).contains(&digits) {
        return Err(Fault::RangeError(
            "toFixed() digits argument must be between 0 and 100".into(),
        ));
    }
    let digits = digits as usize;
    if n.is_nan() {
        return Ok("NaN".to_string());
    }
    if n.abs() >= 1e21 || n.is_infinite() {
        return Ok(format_number(n));
    }

    let sign = if n < 0.0 { "-" } else { "" };
    let x = n.abs();
    let rounded = format!("{x:.digits$}");

    // Rust breaks exact ties to even; JavaScript picks the larger value.
    let exact = format!("{x:.1100}");
    let Some(dot) = exact.find('.') else {
        return Ok(format!("{sign}{rounded}"));
    };
    let tail = &exact[dot + 1 + digits..];
    let is_tie = tail.starts_with('5') && tail[1..].bytes().all(|b| b == b'0');
    if !is_tie {
        return Ok(format!("{sign}{rounded}"));
    }
    let truncated = if digits == 0 {
        exact[..dot].to_string()
    } else {
        exact[..dot + 1 + digits].to_string()
    };
    Ok(format!("{sign}{}", increment_decimal(&truncated)))
}

/// Add one unit in the last place of a plain decimal string.
fn increment_decimal(s: &str) -> String {
    let mut bytes = s.as_bytes().to_vec();
    let mut i = bytes.len();
    loop {
        if i == 0 {
            bytes.insert(0, b'1');
            break;
        }
        i -= 1;
        match bytes[i] {
            b'.' => continue,
            b'9' => bytes[i] = b'0',
            d => {
                bytes[i] = d + 1;
                break;
            }
        }
    }
    String::from_utf8(bytes).unwrap_or_default()
}

/// JavaScript `ToIntegerOrInfinity`.
pub fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

/// `Number(s)` / unary `+s`.
pub fn parse_number(s: &str) -> f64 {
    let s = s.trim_matches(is_js_whitespace);
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return parse_radix_digits(rest, radix).unwrap_or(f64::NAN);
        }
    }
    if is_decimal_literal(s) {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// `[+-] digits [. digits] [(e|E) [+-] digits]`, with digits on at least one
/// side of the point.
fn is_decimal_literal(s: &str) -> bool {
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if (int.is_empty() && frac.is_empty()) || !all_digits(int) || !all_digits(frac) {
        return false;
    }
    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && all_digits(exp)
        }
    }
}

fn parse_radix_digits(s: &str, radix: u32) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let mut value = 0.0;
    for c in s.chars() {
        value = value * f64::from(radix) + f64::from(c.to_digit(radix)?);
    }
    Some(value)
}

/// `parseInt(s)` with the radix inferred from the prefix.
pub fn parse_int(s: &str) -> f64 {
    let s = s.trim_start_matches(is_js_whitespace);
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, s) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(rest) => (16, rest),
        None => (10, s),
    };
    let mut value = 0.0;
    let mut any = false;
    for c in s.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = value * f64::from(radix) + f64::from(d);
        any = true;
    }
    if !any {
        return f64::NAN;
    }
    if negative {
        -value
    } else {
        value
    }
}

/// `x ** y`.
pub fn pow(x: f64, y: f64) -> f64 {
    if y.is_nan() || (x.abs() == 1.0 && y.is_infinite()) {
        return f64::NAN;
    }
    x.powf(y)
}

/// `Math.sign(x)`.
pub fn sign(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 {
        x
    } else if x > 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// An index argument as a position in `0..len`, if it is one.
pub fn exact_index(index: f64, len: usize) -> Option<usize> {
    if index.fract() != 0.0 || index < 0.0 || index >= len as f64 {
        return None;
    }
    Some(index as usize)
}

/// Resolve a `slice` bound against `len` the way JavaScript does.
pub fn relative_index(bound: f64, len: usize) -> usize {
    let bound = to_integer(bound);
    let len_f = len as f64;
    if bound < 0.0 {
        (len_f + bound).max(0.0) as usize
    } else {
        bound.min(len_f) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_integers_and_fractions() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-42.0), "-42");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(3.14), "3.14");
        assert_eq!(format_number(1234.5), "1234.5");
    }

    #[test]
    fn test_format_special_values() {
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn test_format_exponent_thresholds() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(123e25), "1.23e+27");
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(to_fixed(3.14159, 2.0).unwrap(), "3.14");
        assert_eq!(to_fixed(2.5, 0.0).unwrap(), "3");
        assert_eq!(to_fixed(-2.5, 0.0).unwrap(), "-3");
        assert_eq!(to_fixed(1.005, 2.0).unwrap(), "1.00");
        assert_eq!(to_fixed(0.125, 2.0).unwrap(), "0.13");
        assert_eq!(to_fixed(9.5, 0.0).unwrap(), "10");
        assert_eq!(to_fixed(5.0, 1.0).unwrap(), "5.0");
        assert_eq!(to_fixed(f64::NAN, 2.0).unwrap(), "NaN");
        assert!(to_fixed(1.0, 101.0).is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert_eq!(parse_number(".5"), 0.5);
        assert_eq!(parse_number("0x1F"), 31.0);
        assert_eq!(parse_number("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_number("12px").is_nan());
        assert!(parse_number("inf").is_nan());
        assert!(parse_number(".").is_nan());
        assert!(parse_number("1e").is_nan());
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("12px"), 12.0);
        assert_eq!(parse_int("  -7.9"), -7.0);
        assert_eq!(parse_int("0xff"), 255.0);
        assert!(parse_int("px").is_nan());
        assert!(parse_int("").is_nan());
    }

    #[test]
    fn test_pow_and_sign() {
        assert_eq!(pow(2.0, 10.0), 1024.0);
        assert!(pow(1.0, f64::NAN).is_nan());
        assert!(pow(1.0, f64::INFINITY).is_nan());
        assert_eq!(pow(f64::NAN, 0.0), 1.0);
        assert_eq!(sign(-3.0), -1.0);
        assert!(sign(f64::NAN).is_nan());
    }

    #[test]
    fn test_indices() {
        assert_eq!(exact_index(2.0, 3), Some(2));
        assert_eq!(exact_index(3.0, 3), None);
        assert_eq!(exact_index(1.5, 3), None);
        assert_eq!(exact_index(-1.0, 3), None);
        assert_eq!(relative_index(-2.0, 5), 3);
        assert_eq!(relative_index(f64::INFINITY, 5), 5);
        assert_eq!(relative_index(-10.0, 5), 0);
        assert_eq!(relative_index(f64::NAN, 5), 0);
    }
}
