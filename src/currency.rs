// src/currency.rs

/// Format a total the way the cost string asks for: US dollars when the
/// marker mentions "USD" (any case), Indonesian rupiah otherwise.
pub fn format_currency(amount: f64, marker: &str) -> String {
    if marker.to_uppercase().contains("USD") {
        format_usd(amount)
    } else {
        format_idr(amount)
    }
}

/// en-US dollar convention: `$1,234.50`, `-$5.00`.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let sign = if amount < 0.0 && cents != 0 { "-" } else { "" };
    format!(
        "{sign}${}.{:02}",
        group_digits(cents / 100, ','),
        cents % 100
    )
}

/// id-ID rupiah convention with no fraction digits: `Rp 2.000.000`.
pub fn format_idr(amount: f64) -> String {
    let whole = amount.abs().round() as u64;
    let sign = if amount < 0.0 && whole != 0 { "-" } else { "" };
    format!("{sign}Rp {}", group_digits(whole, '.'))
}

/// Grouped number without a currency symbol, up to three fraction digits.
pub fn format_plain(amount: f64) -> String {
    let thousandths = (amount.abs() * 1000.0).round() as u64;
    let sign = if amount < 0.0 && thousandths != 0 { "-" } else { "" };
    let whole = group_digits(thousandths / 1000, ',');
    let frac = thousandths % 1000;
    if frac == 0 {
        return format!("{sign}{whole}");
    }
    let frac = format!("{frac:03}");
    format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
}

fn group_digits(value: u64, sep: char) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usd() {
        assert_eq!(format_usd(150.0), "$150.00");
        assert_eq!(format_usd(1234.5), "$1,234.50");
        assert_eq!(format_usd(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_usd(-5.0), "-$5.00");
        assert_eq!(format_usd(0.0), "$0.00");
    }

    #[test]
    fn test_idr() {
        assert_eq!(format_idr(2_000_000.0), "Rp 2.000.000");
        assert_eq!(format_idr(999.0), "Rp 999");
        assert_eq!(format_idr(1500.6), "Rp 1.501");
        assert_eq!(format_idr(-2000.0), "-Rp 2.000");
        assert_eq!(format_idr(0.0), "Rp 0");
    }

    #[test]
    fn test_plain() {
        assert_eq!(format_plain(1234.0), "1,234");
        assert_eq!(format_plain(1234.5), "1,234.5");
        assert_eq!(format_plain(0.1234), "0.123");
        assert_eq!(format_plain(-42.0), "-42");
    }

    #[test]
    fn test_marker_selects_convention() {
        assert_eq!(format_currency(150.0, "usd 150"), "$150.00");
        assert_eq!(format_currency(150.0, "USD"), "$150.00");
        assert_eq!(format_currency(2_000_000.0, "2000000"), "Rp 2.000.000");
        assert_eq!(format_currency(10.0, "$10"), "Rp 10");
    }
}
