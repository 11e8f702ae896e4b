//! Parsing of population and area tag values

/// Largest population accepted as plausible
pub const MAX_POPULATION: u64 = 100_000_000;

/// Largest area in km² accepted as plausible
pub const MAX_AREA_KM2: f64 = 200_000.0;

/// Whether `s` is digit groups of three joined by `sep`, e.g. `1,234,567`
fn is_grouped(s: &str, sep: char) -> bool {
    let mut groups = s.split(sep);
    let Some(first) = groups.next() else {
        return false;
    };
    let first_ok =
        !first.is_empty() && first.len() <= 3 && first.chars().all(|c| c.is_ascii_digit());
    let mut rest = groups.peekable();
    first_ok
        && rest.peek().is_some()
        && rest.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

/// Remove all kinds of spaces, including non-breaking and thin spaces
fn strip_spaces(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\u{00A0}' | '\u{202F}' | '\u{2009}'))
        .collect()
}

/// Convert a numeric string with optional thousands separators to `f64`
fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim_start_matches(['~', '≈']);
    if s.is_empty() {
        return None;
    }
    let normalized = if s.contains(',') && s.contains('.') {
        // Whichever separator comes last is the decimal mark
        if s.rfind(',') > s.rfind('.') {
            s.replace('.', "").replace(',', ".")
        } else {
            s.replace(',', "")
        }
    } else if is_grouped(s, ',') {
        s.replace(',', "")
    } else if s.contains(',') {
        s.replace(',', ".")
    } else {
        s.to_string()
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a `population` tag value
///
/// Accepts comma, dot or space thousands separators and ignores a trailing
/// annotation such as `(2021)`. Values that are not whole numbers, are zero
/// or exceed [`MAX_POPULATION`] are discarded.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_population(raw: &str) -> Option<u64> {
    let head = raw.split(['(', ';']).next().unwrap_or_default();
    let compact = strip_spaces(head);
    if compact.is_empty() {
        return None;
    }

    let digits = if is_grouped(&compact, '.') || is_grouped(&compact, ',') {
        compact.replace(['.', ','], "")
    } else {
        compact
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<u64>()
        .ok()
        .filter(|p| *p > 0 && *p <= MAX_POPULATION)
}

/// Parse an `area` value into square kilometers
///
/// Recognized units: `km²`, `km2`, `sq km`, `m²`, `m2`, `ha`. A bare number
/// is taken as km². Non-positive values or values above [`MAX_AREA_KM2`]
/// are discarded.
#[must_use]
pub fn parse_area_km2(raw: &str) -> Option<f64> {
    let compact = strip_spaces(&raw.to_lowercase());
    let (number, factor) = if let Some(n) = compact
        .strip_suffix("km²")
        .or_else(|| compact.strip_suffix("km2"))
        .or_else(|| compact.strip_suffix("sqkm"))
    {
        (n, 1.0)
    } else if let Some(n) = compact
        .strip_suffix("m²")
        .or_else(|| compact.strip_suffix("m2"))
    {
        (n, 1e-6)
    } else if let Some(n) = compact.strip_suffix("ha") {
        (n, 0.01)
    } else {
        (compact.as_str(), 1.0)
    };

    parse_number(number)
        .map(|v| v * factor)
        .filter(|area| *area > 0.0 && *area <= MAX_AREA_KM2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_plain_and_grouped() {
        assert_eq!(parse_population("325182"), Some(325_182));
        assert_eq!(parse_population("325,182"), Some(325_182));
        assert_eq!(parse_population("1.234.567"), Some(1_234_567));
        assert_eq!(parse_population("12 345"), Some(12_345));
        assert_eq!(parse_population("12\u{00A0}345"), Some(12_345));
    }

    #[test]
    fn population_with_annotation() {
        assert_eq!(parse_population("91518 (2021)"), Some(91_518));
    }

    #[test]
    fn population_rejects_nonsense() {
        assert_eq!(parse_population("unknown"), None);
        assert_eq!(parse_population("12.5"), None);
        assert_eq!(parse_population("0"), None);
        assert_eq!(parse_population(""), None);
        assert_eq!(parse_population("-5"), None);
    }

    #[test]
    fn population_upper_bound() {
        assert_eq!(parse_population("100000000"), Some(100_000_000));
        assert_eq!(parse_population("100000001"), None);
    }

    #[test]
    fn area_units() {
        assert_eq!(parse_area_km2("19.31 km²"), Some(19.31));
        assert_eq!(parse_area_km2("19.31km2"), Some(19.31));
        assert_eq!(parse_area_km2("19,31 km²"), Some(19.31));
        assert!((parse_area_km2("2500000 m²").unwrap() - 2.5).abs() < 1e-9);
        assert!((parse_area_km2("150 ha").unwrap() - 1.5).abs() < 1e-9);
        assert_eq!(parse_area_km2("42"), Some(42.0));
    }

    #[test]
    fn area_thousands_separator() {
        assert_eq!(parse_area_km2("1,234 km²"), Some(1234.0));
        assert_eq!(parse_area_km2("1.234,5 km2"), Some(1234.5));
    }

    #[test]
    fn area_bounds() {
        assert_eq!(parse_area_km2("200001"), None);
        assert_eq!(parse_area_km2("0 km²"), None);
        assert_eq!(parse_area_km2("big"), None);
    }
}
