//! Conversion of site-native chapter numerals into canonical indices.
//!
//! Chinese serial sites number chapters with Chinese numerals (`第一百零五章`),
//! occasionally with financial forms (`壹佰零伍`) or plain digits. Everything
//! is reduced to a [`ChapterIndex`].

use crate::chapter::ChapterIndex;
use crate::error::ConversionError;

/// Prefix wrapping a chapter numeral, as in `第十章`.
const PREFIXES: &[char] = &['第'];

/// Suffixes wrapping a chapter numeral.
const SUFFIXES: &[char] = &['章', '回', '节', '節', '话', '話', '卷', '集'];

/// Converts a native numeral string into a chapter index.
///
/// Accepts ASCII and full-width digits, Chinese numerals with units up to
/// `万`, financial numerals, and positional digit runs like `一〇二`.
pub fn normalize(native: &str) -> Result<ChapterIndex, ConversionError> {
    let stripped = strip_wrappers(native);
    if stripped.is_empty() {
        return Err(ConversionError::Empty);
    }

    let value = if stripped.chars().all(|c| ascii_or_wide_digit(c).is_some()) {
        parse_decimal(stripped)?
    } else {
        parse_chinese(stripped)?
    };

    u32::try_from(value)
        .ok()
        .and_then(ChapterIndex::new)
        .ok_or_else(|| ConversionError::OutOfRange(native.to_string()))
}

fn strip_wrappers(input: &str) -> &str {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix(PREFIXES).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(SUFFIXES).unwrap_or(trimmed);
    trimmed.trim()
}

fn ascii_or_wide_digit(c: char) -> Option<u64> {
    match c {
        '0'..='9' => Some(c as u64 - '0' as u64),
        '０'..='９' => Some(c as u64 - '０' as u64),
        _ => None,
    }
}

fn chinese_digit(c: char) -> Option<u64> {
    Some(match c {
        '零' | '〇' => 0,
        '一' | '壹' => 1,
        '二' | '贰' | '貳' | '两' | '兩' => 2,
        '三' | '叁' | '參' => 3,
        '四' | '肆' => 4,
        '五' | '伍' => 5,
        '六' | '陆' | '陸' => 6,
        '七' | '柒' => 7,
        '八' | '捌' => 8,
        '九' | '玖' => 9,
        _ => return None,
    })
}

fn chinese_unit(c: char) -> Option<u64> {
    Some(match c {
        '十' | '拾' => 10,
        '百' | '佰' => 100,
        '千' | '仟' => 1_000,
        '万' | '萬' => 10_000,
        _ => return None,
    })
}

fn parse_decimal(digits: &str) -> Result<u64, ConversionError> {
    digits.chars().try_fold(0u64, |acc, c| {
        let d = ascii_or_wide_digit(c).unwrap_or_default();
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(d))
            .ok_or_else(|| ConversionError::OutOfRange(digits.to_string()))
    })
}

fn parse_chinese(input: &str) -> Result<u64, ConversionError> {
    for c in input.chars() {
        if chinese_digit(c).is_none() && chinese_unit(c).is_none() {
            return Err(ConversionError::UnknownCharacter {
                input: input.to_string(),
                ch: c,
            });
        }
    }

    // No units at all: a positional run such as 一〇二.
    if !input.chars().any(|c| chinese_unit(c).is_some()) {
        return input.chars().try_fold(0u64, |acc, c| {
            let d = chinese_digit(c).unwrap_or_default();
            acc.checked_mul(10)
                .and_then(|v| v.checked_add(d))
                .ok_or_else(|| ConversionError::OutOfRange(input.to_string()))
        });
    }

    let malformed = || ConversionError::Malformed(input.to_string());

    let mut total: u64 = 0;
    let mut section: u64 = 0;
    let mut pending: Option<u64> = None;
    let mut last_unit: u64 = u64::MAX;
    let mut seen_wan = false;

    for c in input.chars() {
        if let Some(d) = chinese_digit(c) {
            if d == 0 {
                pending = None;
                continue;
            }
            if pending.is_some() {
                return Err(malformed());
            }
            pending = Some(d);
        } else if let Some(unit) = chinese_unit(c) {
            if unit == 10_000 {
                if seen_wan {
                    return Err(malformed());
                }
                let head = section + pending.take().unwrap_or(0);
                if head == 0 {
                    return Err(malformed());
                }
                total = head * 10_000;
                section = 0;
                last_unit = u64::MAX;
                seen_wan = true;
                continue;
            }
            if unit >= last_unit {
                return Err(malformed());
            }
            let multiplier = match pending.take() {
                Some(d) => d,
                // 十 alone reads as 一十.
                None if unit == 10 => 1,
                None => return Err(malformed()),
            };
            section += multiplier * unit;
            last_unit = unit;
        }
    }

    Ok(total + section + pending.unwrap_or(0))
}
