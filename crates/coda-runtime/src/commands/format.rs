//! Numeric formatting compatible with .NET Framework 4 `Double.ToString`.
//!
//! A double is first reduced to a decimal digit string and a scale (the
//! position of the decimal point relative to the first digit), rounded half
//! away from zero, and then laid out by a standard specifier or a custom
//! pattern.

use std::sync::OnceLock;

use coda_core::{CodaError, ErrorKind};
use regex::Regex;

const DEFAULT_PRECISION: usize = 15;
const ROUND_TRIP_PRECISION: usize = 17;

fn standard_format_regex() -> &'static Regex {
    static STANDARD: OnceLock<Regex> = OnceLock::new();
    STANDARD.get_or_init(|| {
        Regex::new(r"^([A-Za-z])(\d{1,2})?$").expect("standard format regex must compile")
    })
}

/// Formats `value` with a standard (`N2`, `E`, `P1`, ...) or custom
/// (`#,##0.00;(#)`) format string under the named locale.
pub fn format_number(value: f64, format: &str, locale: &str) -> Result<String, CodaError> {
    let info = NumberFormatInfo::for_locale(locale)?;
    let specifier = parse_format(format)?;

    if value.is_nan() {
        return Ok(info.nan.to_string());
    }
    if value.is_infinite() {
        let symbol = if value > 0.0 {
            info.positive_infinity
        } else {
            info.negative_infinity
        };
        return Ok(symbol.to_string());
    }

    match specifier {
        Specifier::Standard { letter, precision } => {
            format_standard(value, letter, precision, info)
        }
        Specifier::Custom(pattern) => Ok(format_custom(value, &pattern, info)),
    }
}

enum Specifier {
    Standard {
        letter: char,
        precision: Option<usize>,
    },
    Custom(Vec<char>),
}

fn parse_format(format: &str) -> Result<Specifier, CodaError> {
    if format.is_empty() {
        return Ok(Specifier::Standard {
            letter: 'G',
            precision: None,
        });
    }
    if let Some(captures) = standard_format_regex().captures(format) {
        let letter = captures[1].chars().next().unwrap_or('G');
        let precision = captures
            .get(2)
            .and_then(|digits| digits.as_str().parse::<usize>().ok());
        if !matches!(
            letter.to_ascii_uppercase(),
            'C' | 'E' | 'F' | 'G' | 'N' | 'P' | 'R'
        ) {
            return Err(format_error(format!(
                "\"{}\" is not a supported standard format specifier.",
                format
            )));
        }
        return Ok(Specifier::Standard { letter, precision });
    }

    let pattern = format.chars().collect::<Vec<_>>();
    validate_custom(&pattern, format)?;
    Ok(Specifier::Custom(pattern))
}

fn validate_custom(pattern: &[char], raw: &str) -> Result<(), CodaError> {
    let mut sections = 1;
    let mut index = 0;
    while let Some(&ch) = pattern.get(index) {
        index += 1;
        match ch {
            '\'' | '"' => {
                let Some(offset) = pattern[index..].iter().position(|c| *c == ch) else {
                    return Err(format_error(format!(
                        "Format \"{}\" has an unterminated {} literal.",
                        raw, ch
                    )));
                };
                index += offset + 1;
            }
            '\\' => {
                if index >= pattern.len() {
                    return Err(format_error(format!(
                        "Format \"{}\" ends with a dangling escape.",
                        raw
                    )));
                }
                index += 1;
            }
            ';' => {
                sections += 1;
                if sections > 3 {
                    return Err(format_error(format!(
                        "Format \"{}\" has more than three sections.",
                        raw
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn format_error(message: String) -> CodaError {
    CodaError::new(ErrorKind::FormatError, message)
}

struct NumberFormatInfo {
    decimal_separator: &'static str,
    group_separator: &'static str,
    group_sizes: &'static [usize],
    negative_sign: &'static str,
    positive_sign: &'static str,
    nan: &'static str,
    positive_infinity: &'static str,
    negative_infinity: &'static str,
    number_decimal_digits: usize,
    number_negative_pattern: usize,
    currency_symbol: &'static str,
    currency_decimal_digits: usize,
    currency_positive_pattern: usize,
    currency_negative_pattern: usize,
    percent_symbol: &'static str,
    per_mille_symbol: &'static str,
    percent_decimal_digits: usize,
    percent_positive_pattern: usize,
    percent_negative_pattern: usize,
}

const INVARIANT: NumberFormatInfo = NumberFormatInfo {
    decimal_separator: ".",
    group_separator: ",",
    group_sizes: &[3],
    negative_sign: "-",
    positive_sign: "+",
    nan: "NaN",
    positive_infinity: "Infinity",
    negative_infinity: "-Infinity",
    number_decimal_digits: 2,
    number_negative_pattern: 1,
    currency_symbol: "\u{a4}",
    currency_decimal_digits: 2,
    currency_positive_pattern: 0,
    currency_negative_pattern: 0,
    percent_symbol: "%",
    per_mille_symbol: "\u{2030}",
    percent_decimal_digits: 2,
    percent_positive_pattern: 0,
    percent_negative_pattern: 0,
};

const EN_US: NumberFormatInfo = NumberFormatInfo {
    currency_symbol: "$",
    ..INVARIANT
};

const EN_GB: NumberFormatInfo = NumberFormatInfo {
    currency_symbol: "\u{a3}",
    currency_negative_pattern: 1,
    percent_positive_pattern: 1,
    percent_negative_pattern: 1,
    ..INVARIANT
};

const DE_DE: NumberFormatInfo = NumberFormatInfo {
    decimal_separator: ",",
    group_separator: ".",
    nan: "n. def.",
    positive_infinity: "+unendlich",
    negative_infinity: "-unendlich",
    currency_symbol: "\u{20ac}",
    currency_positive_pattern: 3,
    currency_negative_pattern: 8,
    ..INVARIANT
};

const FR_FR: NumberFormatInfo = NumberFormatInfo {
    decimal_separator: ",",
    group_separator: "\u{a0}",
    nan: "Non Num\u{e9}rique",
    positive_infinity: "+Infini",
    negative_infinity: "-Infini",
    currency_symbol: "\u{20ac}",
    currency_positive_pattern: 3,
    currency_negative_pattern: 8,
    ..INVARIANT
};

impl NumberFormatInfo {
    fn for_locale(name: &str) -> Result<&'static NumberFormatInfo, CodaError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "invariant" => Ok(&INVARIANT),
            "en-us" => Ok(&EN_US),
            "en-gb" => Ok(&EN_GB),
            "de-de" => Ok(&DE_DE),
            "fr-fr" => Ok(&FR_FR),
            _ => Err(format_error(format!("Unknown locale \"{}\".", name))),
        }
    }
}

const CURRENCY_POSITIVE_PATTERNS: [&str; 4] = ["$#", "#$", "$ #", "# $"];
const CURRENCY_NEGATIVE_PATTERNS: [&str; 16] = [
    "($#)", "-$#", "$-#", "$#-", "(#$)", "-#$", "#-$", "#$-", "-# $", "-$ #", "# $-", "$ #-",
    "$ -#", "#- $", "($ #)", "(# $)",
];
const NUMBER_NEGATIVE_PATTERNS: [&str; 5] = ["(#)", "-#", "- #", "#-", "# -"];
const PERCENT_POSITIVE_PATTERNS: [&str; 4] = ["# %", "#%", "%#", "% #"];
const PERCENT_NEGATIVE_PATTERNS: [&str; 12] = [
    "-# %", "-#%", "-%#", "%-#", "%#-", "#-%", "#%-", "-% #", "# %-", "% #-", "% -#", "#- %",
];

/// Decimal digits without trailing zeros, `0.d1d2d3... * 10^scale`.
#[derive(Debug, Clone, PartialEq)]
struct Number {
    digits: Vec<u8>,
    scale: i32,
    negative: bool,
}

impl Number {
    fn from_f64(value: f64, precision: usize) -> Self {
        let negative = value.is_sign_negative();
        if value == 0.0 {
            return Self {
                digits: Vec::new(),
                scale: 0,
                negative,
            };
        }

        let rendered = format!("{:.*e}", precision.saturating_sub(1), value.abs());
        let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
        let mut digits = mantissa
            .bytes()
            .filter(u8::is_ascii_digit)
            .collect::<Vec<_>>();
        while digits.last() == Some(&b'0') {
            digits.pop();
        }
        Self {
            digits,
            scale: exponent.parse::<i32>().unwrap_or(0) + 1,
            negative,
        }
    }

    fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    /// Keeps `pos` digits, rounding half away from zero. A result of zero
    /// loses its sign.
    fn round(&mut self, pos: i32) {
        let mut kept = if pos <= 0 {
            0
        } else {
            (pos as usize).min(self.digits.len())
        };
        let round_up = pos >= 0
            && kept == pos as usize
            && self.digits.get(kept).is_some_and(|digit| *digit >= b'5');

        if round_up {
            while kept > 0 && self.digits[kept - 1] == b'9' {
                kept -= 1;
            }
            if kept > 0 {
                self.digits[kept - 1] += 1;
            } else {
                self.scale += 1;
                self.digits[0] = b'1';
                kept = 1;
            }
        } else {
            while kept > 0 && self.digits[kept - 1] == b'0' {
                kept -= 1;
            }
        }

        if kept == 0 {
            self.scale = 0;
            self.negative = false;
        }
        self.digits.truncate(kept);
    }

    fn to_f64(&self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        let digits = String::from_utf8_lossy(&self.digits);
        let sign = if self.negative { "-" } else { "" };
        format!("{}0.{}e{}", sign, digits, self.scale)
            .parse::<f64>()
            .unwrap_or(f64::NAN)
    }
}

struct DigitCursor<'a> {
    digits: &'a [u8],
    index: usize,
}

impl<'a> DigitCursor<'a> {
    fn new(number: &'a Number) -> Self {
        Self {
            digits: &number.digits,
            index: 0,
        }
    }

    fn has_more(&self) -> bool {
        self.index < self.digits.len()
    }

    fn digit(&mut self) -> Option<char> {
        let digit = self.digits.get(self.index).copied()?;
        self.index += 1;
        Some(char::from(digit))
    }

    fn digit_or_zero(&mut self) -> char {
        self.digit().unwrap_or('0')
    }
}

fn format_standard(
    value: f64,
    letter: char,
    precision: Option<usize>,
    info: &NumberFormatInfo,
) -> Result<String, CodaError> {
    let upper = letter.to_ascii_uppercase();
    let exponent_char = if letter.is_ascii_lowercase() { 'e' } else { 'E' };
    match upper {
        'R' => return Ok(format_round_trip(value, exponent_char, info)),
        _ => {}
    }

    let digits = match (upper, precision) {
        ('E', Some(precision)) if precision > 14 => ROUND_TRIP_PRECISION,
        ('G', Some(precision)) if precision > 15 => ROUND_TRIP_PRECISION,
        _ => DEFAULT_PRECISION,
    };
    let mut number = Number::from_f64(value, digits);
    let mut out = String::new();

    match upper {
        'C' => {
            let decimals = precision.unwrap_or(info.currency_decimal_digits);
            number.round(number.scale + decimals as i32);
            let pattern = if number.negative {
                CURRENCY_NEGATIVE_PATTERNS[info.currency_negative_pattern]
            } else {
                CURRENCY_POSITIVE_PATTERNS[info.currency_positive_pattern]
            };
            expand_pattern(&mut out, pattern, &number, decimals, info);
        }
        'F' => {
            let decimals = precision.unwrap_or(info.number_decimal_digits);
            number.round(number.scale + decimals as i32);
            if number.negative {
                out.push_str(info.negative_sign);
            }
            append_fixed(&mut out, &number, decimals, false, info);
        }
        'N' => {
            let decimals = precision.unwrap_or(info.number_decimal_digits);
            number.round(number.scale + decimals as i32);
            let pattern = if number.negative {
                NUMBER_NEGATIVE_PATTERNS[info.number_negative_pattern]
            } else {
                "#"
            };
            expand_pattern(&mut out, pattern, &number, decimals, info);
        }
        'E' => {
            let significant = precision.unwrap_or(6) + 1;
            number.round(significant as i32);
            if number.negative {
                out.push_str(info.negative_sign);
            }
            append_scientific(&mut out, &number, significant, exponent_char, info);
        }
        'G' => {
            let significant = match precision {
                Some(precision) if precision >= 1 => precision,
                _ => DEFAULT_PRECISION,
            };
            number.round(significant as i32);
            if number.negative {
                out.push_str(info.negative_sign);
            }
            append_general(&mut out, &number, significant, exponent_char, info);
        }
        'P' => {
            let decimals = precision.unwrap_or(info.percent_decimal_digits);
            number.scale += 2;
            number.round(number.scale + decimals as i32);
            let pattern = if number.negative {
                PERCENT_NEGATIVE_PATTERNS[info.percent_negative_pattern]
            } else {
                PERCENT_POSITIVE_PATTERNS[info.percent_positive_pattern]
            };
            expand_pattern(&mut out, pattern, &number, decimals, info);
        }
        _ => {
            return Err(format_error(format!(
                "\"{}\" is not a supported standard format specifier.",
                letter
            )))
        }
    }
    Ok(out)
}

/// Shortest of 15 or 17 significant digits that parses back to `value`.
fn format_round_trip(value: f64, exponent_char: char, info: &NumberFormatInfo) -> String {
    let mut number = Number::from_f64(value, DEFAULT_PRECISION);
    let mut significant = DEFAULT_PRECISION;
    if number.to_f64() != value {
        number = Number::from_f64(value, ROUND_TRIP_PRECISION);
        significant = ROUND_TRIP_PRECISION;
    }
    number.round(significant as i32);
    let mut out = String::new();
    if number.negative {
        out.push_str(info.negative_sign);
    }
    append_general(&mut out, &number, significant, exponent_char, info);
    out
}

fn expand_pattern(
    out: &mut String,
    pattern: &str,
    number: &Number,
    decimals: usize,
    info: &NumberFormatInfo,
) {
    for ch in pattern.chars() {
        match ch {
            '#' => append_fixed(out, number, decimals, true, info),
            '-' => out.push_str(info.negative_sign),
            '$' => out.push_str(info.currency_symbol),
            '%' => out.push_str(info.percent_symbol),
            other => out.push(other),
        }
    }
}

fn append_fixed(
    out: &mut String,
    number: &Number,
    decimals: usize,
    grouped: bool,
    info: &NumberFormatInfo,
) {
    let mut cursor = DigitCursor::new(number);
    if number.scale > 0 {
        let integer = (0..number.scale)
            .map(|_| cursor.digit_or_zero())
            .collect::<String>();
        if grouped {
            out.push_str(&group_integer(&integer, info));
        } else {
            out.push_str(&integer);
        }
    } else {
        out.push('0');
    }

    if decimals > 0 {
        out.push_str(info.decimal_separator);
        let mut remaining = decimals;
        if number.scale < 0 {
            let zeros = (number.scale.unsigned_abs() as usize).min(remaining);
            out.extend(std::iter::repeat('0').take(zeros));
            remaining -= zeros;
        }
        for _ in 0..remaining {
            out.push(cursor.digit_or_zero());
        }
    }
}

fn group_integer(integer: &str, info: &NumberFormatInfo) -> String {
    let digits = integer.chars().collect::<Vec<_>>();
    let mut boundaries = Vec::new();
    let mut total = 0;
    let mut size_index = 0;
    while let Some(&size) = info.group_sizes.get(size_index) {
        if size == 0 {
            break;
        }
        total += size;
        if total >= digits.len() {
            break;
        }
        boundaries.push(digits.len() - total);
        if size_index + 1 < info.group_sizes.len() {
            size_index += 1;
        }
    }

    let mut out = String::with_capacity(integer.len() + boundaries.len());
    for (index, digit) in digits.iter().enumerate() {
        if index > 0 && boundaries.contains(&index) {
            out.push_str(info.group_separator);
        }
        out.push(*digit);
    }
    out
}

fn append_scientific(
    out: &mut String,
    number: &Number,
    significant: usize,
    exponent_char: char,
    info: &NumberFormatInfo,
) {
    let mut cursor = DigitCursor::new(number);
    out.push(cursor.digit_or_zero());
    if significant != 1 {
        out.push_str(info.decimal_separator);
    }
    for _ in 1..significant {
        out.push(cursor.digit_or_zero());
    }
    let exponent = if number.is_zero() { 0 } else { number.scale - 1 };
    append_exponent(out, exponent, exponent_char, 3, true, info);
}

fn append_general(
    out: &mut String,
    number: &Number,
    significant: usize,
    exponent_char: char,
    info: &NumberFormatInfo,
) {
    let mut position = number.scale;
    let scientific = position > significant as i32 || position < -3;
    if scientific {
        position = 1;
    }

    let mut cursor = DigitCursor::new(number);
    if position > 0 {
        while position > 0 {
            out.push(cursor.digit_or_zero());
            position -= 1;
        }
    } else {
        out.push('0');
    }

    if cursor.has_more() || position < 0 {
        out.push_str(info.decimal_separator);
        while position < 0 {
            out.push('0');
            position += 1;
        }
        while let Some(digit) = cursor.digit() {
            out.push(digit);
        }
    }

    if scientific {
        append_exponent(out, number.scale - 1, exponent_char, 2, true, info);
    }
}

fn append_exponent(
    out: &mut String,
    exponent: i32,
    exponent_char: char,
    min_digits: usize,
    positive_sign: bool,
    info: &NumberFormatInfo,
) {
    out.push(exponent_char);
    if exponent < 0 {
        out.push_str(info.negative_sign);
    } else if positive_sign {
        out.push_str(info.positive_sign);
    }
    out.push_str(&format!(
        "{:0>width$}",
        exponent.unsigned_abs(),
        width = min_digits
    ));
}

/// Start of the `section`-th `;`-separated part, falling back to the first.
fn find_section(pattern: &[char], section: usize) -> usize {
    if section == 0 {
        return 0;
    }
    let mut remaining = section;
    let mut index = 0;
    while let Some(&ch) = pattern.get(index) {
        index += 1;
        match ch {
            '\'' | '"' => {
                while let Some(&inner) = pattern.get(index) {
                    index += 1;
                    if inner == ch {
                        break;
                    }
                }
            }
            '\\' => {
                if index < pattern.len() {
                    index += 1;
                }
            }
            ';' => {
                remaining -= 1;
                if remaining != 0 {
                    continue;
                }
                if pattern.get(index).is_some_and(|next| *next != ';') {
                    return index;
                }
                return 0;
            }
            _ => {}
        }
    }
    0
}

/// Layout facts gathered from one section of a custom pattern.
struct SectionLayout {
    digit_count: i32,
    decimal_pos: i32,
    first_digit: i32,
    last_digit: i32,
    scientific: bool,
    thousand_seps: bool,
    scale_adjust: i32,
}

fn scan_section(pattern: &[char], start: usize) -> SectionLayout {
    let mut layout = SectionLayout {
        digit_count: 0,
        decimal_pos: -1,
        first_digit: i32::MAX,
        last_digit: 0,
        scientific: false,
        thousand_seps: false,
        scale_adjust: 0,
    };
    let mut thousand_pos = -1;
    let mut thousand_count = 0;

    let mut index = start;
    while let Some(&ch) = pattern.get(index) {
        index += 1;
        match ch {
            ';' => break,
            '#' => layout.digit_count += 1,
            '0' => {
                if layout.first_digit == i32::MAX {
                    layout.first_digit = layout.digit_count;
                }
                layout.digit_count += 1;
                layout.last_digit = layout.digit_count;
            }
            '.' => {
                if layout.decimal_pos < 0 {
                    layout.decimal_pos = layout.digit_count;
                }
            }
            ',' => {
                if layout.digit_count > 0 && layout.decimal_pos < 0 {
                    if thousand_pos >= 0 {
                        if thousand_pos == layout.digit_count {
                            thousand_count += 1;
                            continue;
                        }
                        layout.thousand_seps = true;
                    }
                    thousand_pos = layout.digit_count;
                    thousand_count = 1;
                }
            }
            '%' => layout.scale_adjust += 2,
            '\u{2030}' => layout.scale_adjust += 3,
            '\'' | '"' => {
                while let Some(&inner) = pattern.get(index) {
                    index += 1;
                    if inner == ch {
                        break;
                    }
                }
            }
            '\\' => {
                if index < pattern.len() {
                    index += 1;
                }
            }
            'E' | 'e' => {
                let next = pattern.get(index).copied();
                let after = pattern.get(index + 1).copied();
                if next == Some('0')
                    || (matches!(next, Some('+') | Some('-')) && after == Some('0'))
                {
                    index += 1;
                    while pattern.get(index) == Some(&'0') {
                        index += 1;
                    }
                    layout.scientific = true;
                }
            }
            _ => {}
        }
    }

    if layout.decimal_pos < 0 {
        layout.decimal_pos = layout.digit_count;
    }
    if thousand_pos >= 0 {
        if thousand_pos == layout.decimal_pos {
            layout.scale_adjust -= thousand_count * 3;
        } else {
            layout.thousand_seps = true;
        }
    }
    layout
}

fn format_custom(value: f64, pattern: &[char], info: &NumberFormatInfo) -> String {
    let mut number = Number::from_f64(value, DEFAULT_PRECISION);
    let mut section = find_section(
        pattern,
        if number.is_zero() {
            2
        } else if number.negative {
            1
        } else {
            0
        },
    );

    let layout = loop {
        let layout = scan_section(pattern, section);
        if number.is_zero() {
            number.negative = false;
            number.scale = 0;
            break layout;
        }
        number.scale += layout.scale_adjust;
        let position = if layout.scientific {
            layout.digit_count
        } else {
            number.scale + layout.digit_count - layout.decimal_pos
        };
        number.round(position);
        if number.is_zero() {
            let zero_section = find_section(pattern, 2);
            if zero_section != section {
                section = zero_section;
                continue;
            }
        }
        break layout;
    };

    let first_digit = if layout.first_digit < layout.decimal_pos {
        layout.decimal_pos - layout.first_digit
    } else {
        0
    };
    let last_digit = if layout.last_digit > layout.decimal_pos {
        layout.decimal_pos - layout.last_digit
    } else {
        0
    };
    let (mut digit_pos, mut adjust) = if layout.scientific {
        (layout.decimal_pos, 0)
    } else {
        (
            number.scale.max(layout.decimal_pos),
            number.scale - layout.decimal_pos,
        )
    };

    let mut separators = Vec::new();
    if layout.thousand_seps && !info.group_separator.is_empty() {
        let mut size_index = 0;
        let mut group_size = info.group_sizes.first().copied().unwrap_or(0) as i32;
        let mut group_total = group_size;
        let total_digits = digit_pos + adjust.min(0);
        let significant = first_digit.max(total_digits);
        while significant > group_total && group_size != 0 {
            separators.push(group_total);
            if size_index + 1 < info.group_sizes.len() {
                size_index += 1;
                group_size = info.group_sizes[size_index] as i32;
            }
            group_total += group_size;
        }
    }

    let mut out = String::new();
    if number.negative && section == 0 {
        out.push_str(info.negative_sign);
    }

    let mut cursor = DigitCursor::new(&number);
    let mut scientific = layout.scientific;
    let mut decimal_written = false;
    let mut push_digit = |out: &mut String, digit: char, digit_pos: i32| {
        out.push(digit);
        if layout.thousand_seps && digit_pos > 1 && separators.last() == Some(&(digit_pos - 1)) {
            out.push_str(info.group_separator);
            separators.pop();
        }
    };

    let mut index = section;
    while let Some(&ch) = pattern.get(index) {
        index += 1;
        if ch == ';' {
            break;
        }
        if adjust > 0 && matches!(ch, '#' | '0' | '.') {
            while adjust > 0 {
                push_digit(&mut out, cursor.digit_or_zero(), digit_pos);
                digit_pos -= 1;
                adjust -= 1;
            }
        }

        match ch {
            '#' | '0' => {
                let digit = if adjust < 0 {
                    adjust += 1;
                    (digit_pos <= first_digit).then_some('0')
                } else {
                    cursor
                        .digit()
                        .or((digit_pos > last_digit).then_some('0'))
                };
                if let Some(digit) = digit {
                    push_digit(&mut out, digit, digit_pos);
                }
                digit_pos -= 1;
            }
            '.' => {
                if digit_pos != 0 || decimal_written {
                    continue;
                }
                if last_digit < 0 || (layout.decimal_pos < layout.digit_count && cursor.has_more())
                {
                    out.push_str(info.decimal_separator);
                    decimal_written = true;
                }
            }
            '\u{2030}' => out.push_str(info.per_mille_symbol),
            '%' => out.push_str(info.percent_symbol),
            ',' => {}
            '\'' | '"' => {
                while let Some(&inner) = pattern.get(index) {
                    index += 1;
                    if inner == ch {
                        break;
                    }
                    out.push(inner);
                }
            }
            '\\' => {
                if let Some(&escaped) = pattern.get(index) {
                    out.push(escaped);
                    index += 1;
                }
            }
            'E' | 'e' => {
                let next = pattern.get(index).copied();
                let after = pattern.get(index + 1).copied();
                if !scientific {
                    out.push(ch);
                    if let Some(sign @ ('+' | '-')) = next {
                        out.push(sign);
                        index += 1;
                    }
                    while pattern.get(index) == Some(&'0') {
                        out.push('0');
                        index += 1;
                    }
                    continue;
                }

                let (zeros_start, positive_sign) = match (next, after) {
                    (Some('0'), _) => (index, false),
                    (Some('+'), Some('0')) => (index + 1, true),
                    (Some('-'), Some('0')) => (index + 1, false),
                    _ => {
                        out.push(ch);
                        continue;
                    }
                };
                let mut zeros_end = zeros_start;
                while pattern.get(zeros_end) == Some(&'0') {
                    zeros_end += 1;
                }
                index = zeros_end;
                let exponent = if number.is_zero() {
                    0
                } else {
                    number.scale - layout.decimal_pos
                };
                append_exponent(
                    &mut out,
                    exponent,
                    ch,
                    (zeros_end - zeros_start).min(10),
                    positive_sign,
                    info,
                );
                scientific = false;
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: f64, format: &str) -> String {
        format_number(value, format, "").expect("format")
    }

    fn fmt_in(value: f64, format: &str, locale: &str) -> String {
        format_number(value, format, locale).expect("format")
    }

    #[test]
    fn fixed_and_number_round_half_away_from_zero() {
        assert_eq!(fmt(1234.5678, "F2"), "1234.57");
        assert_eq!(fmt(1234.5678, "N2"), "1,234.57");
        assert_eq!(fmt(2.5, "F0"), "3");
        assert_eq!(fmt(-2.5, "F0"), "-3");
        assert_eq!(fmt(0.125, "F2"), "0.13");
        assert_eq!(fmt(-0.001, "F2"), "0.00");
        assert_eq!(fmt(0.6, "F0"), "1");
        assert_eq!(fmt(0.05, "F3"), "0.050");
        assert_eq!(fmt(-1234567.891, "N"), "-1,234,567.89");
        assert_eq!(fmt(999.999, "N2"), "1,000.00");
    }

    #[test]
    fn scientific_pads_the_exponent_to_three_digits() {
        assert_eq!(fmt(1234.5678, "E"), "1.234568E+003");
        assert_eq!(fmt(1234.5678, "e2"), "1.23e+003");
        assert_eq!(fmt(0.000123, "E1"), "1.2E-004");
        assert_eq!(fmt(0.0, "E2"), "0.00E+000");
    }

    #[test]
    fn general_switches_to_scientific_outside_its_range() {
        assert_eq!(fmt(1234.5678, ""), "1234.5678");
        assert_eq!(fmt(1.5e20, "G"), "1.5E+20");
        assert_eq!(fmt(0.0001, "G"), "0.0001");
        assert_eq!(fmt(0.00001, "G"), "1E-05");
        assert_eq!(fmt(123.456, "G2"), "1.2E+02");
        assert_eq!(fmt(123.456, "g4"), "123.5");
        assert_eq!(fmt(0.0, "G"), "0");
        assert_eq!(fmt(-42.0, "G"), "-42");
    }

    #[test]
    fn round_trip_falls_back_to_seventeen_digits() {
        assert_eq!(fmt(0.1 + 0.2, "R"), "0.30000000000000004");
        assert_eq!(fmt(0.5, "R"), "0.5");
        assert_eq!(fmt(1e21, "R"), "1E+21");
    }

    #[test]
    fn integral_only_specifiers_are_rejected_for_doubles() {
        for format in ["D", "D6", "d", "X", "x4", "X8"] {
            for value in [1234.0, 255.0, -1.0, 1.5] {
                let error = format_number(value, format, "").expect_err(format);
                assert_eq!(error.kind, ErrorKind::FormatError, "{} {}", format, value);
            }
        }
    }

    #[test]
    fn currency_and_percent_follow_locale_patterns() {
        assert_eq!(fmt_in(123.456, "C", "en-US"), "$123.46");
        assert_eq!(fmt_in(-123.456, "C", "en-US"), "($123.46)");
        assert_eq!(fmt(123.456, "C"), "\u{a4}123.46");
        assert_eq!(fmt_in(-5.0, "C0", "en-GB"), "-\u{a3}5");
        assert_eq!(fmt_in(1234.5, "C", "de-DE"), "1.234,50 \u{20ac}");
        assert_eq!(fmt_in(-1234.5, "C", "de-DE"), "-1.234,50 \u{20ac}");

        assert_eq!(fmt(0.1234, "P"), "12.34 %");
        assert_eq!(fmt(-0.1234, "P1"), "-12.3 %");
        assert_eq!(fmt_in(0.1234, "P0", "en-GB"), "12%");
    }

    #[test]
    fn locales_change_separators() {
        assert_eq!(fmt_in(1234.5678, "N2", "de-DE"), "1.234,57");
        assert_eq!(fmt_in(1234.5678, "N2", "fr-FR"), "1\u{a0}234,57");
        assert_eq!(fmt_in(1234.5678, "N2", "EN-us"), "1,234.57");
        assert_eq!(fmt_in(0.5, "F1", "invariant"), "0.5");
        let error = format_number(1.0, "N", "tlh-KL").expect_err("unknown locale");
        assert_eq!(error.kind, ErrorKind::FormatError);
    }

    #[test]
    fn non_finite_values_use_locale_symbols() {
        assert_eq!(fmt(f64::NAN, "N2"), "NaN");
        assert_eq!(fmt(f64::INFINITY, "F"), "Infinity");
        assert_eq!(fmt(f64::NEG_INFINITY, "0.00"), "-Infinity");
        assert_eq!(fmt_in(f64::NAN, "G", "de-DE"), "n. def.");
        assert_eq!(fmt_in(f64::INFINITY, "G", "fr-FR"), "+Infini");
    }

    #[test]
    fn custom_digit_placeholders_and_grouping() {
        assert_eq!(fmt(1234.5678, "#,##0.00"), "1,234.57");
        assert_eq!(fmt(0.5, "0%"), "50%");
        assert_eq!(fmt(123.0, "00000"), "00123");
        assert_eq!(fmt(1234567890.0, "#,##0,,"), "1,235");
        assert_eq!(fmt(0.0, "#"), "");
        assert_eq!(fmt(0.0, "0.0"), "0.0");
        assert_eq!(fmt(-5.0, "#"), "-5");
        assert_eq!(fmt(1.5, "#.##"), "1.5");
        assert_eq!(fmt(0.25, "#.00"), ".25");
        assert_eq!(fmt(0.005, "0.0\u{2030}"), "5.0\u{2030}");
        assert_eq!(fmt_in(1234567.0, "#,#", "de-DE"), "1.234.567");
    }

    #[test]
    fn custom_sections_select_by_sign_and_zero() {
        let format = "0.00;(0.00);zero";
        assert_eq!(fmt(1.5, format), "1.50");
        assert_eq!(fmt(-1.5, format), "(1.50)");
        assert_eq!(fmt(0.0, format), "zero");
        assert_eq!(fmt(0.001, format), "zero");
        assert_eq!(fmt(-7.0, "0;"), "-7");
    }

    #[test]
    fn custom_exponents_and_literals() {
        assert_eq!(fmt(12345.0, "0.###E+0"), "1.235E+4");
        assert_eq!(fmt(0.00123, "0.0e-00"), "1.2e-03");
        assert_eq!(fmt(5.0, "'#'0"), "#5");
        assert_eq!(fmt(5.0, "\\#0"), "#5");
        assert_eq!(fmt(5.0, "0 \"units\""), "5 units");
        assert_eq!(fmt(5.0, "abc"), "abc");
    }

    #[test]
    fn malformed_formats_are_rejected() {
        for format in ["0 'open", "0\\", "0;0;0;0", "Q", "K2"] {
            let error = format_number(1.0, format, "").expect_err(format);
            assert_eq!(error.kind, ErrorKind::FormatError, "{}", format);
        }
    }
}
