use chrono::{NaiveDate, NaiveDateTime};

use crate::config::TimestampFormat;

// ---------------------------------------------------------------------------
// Acquisition timestamps embedded in file names
// ---------------------------------------------------------------------------

/// Find `YYYY?MM?DD` anywhere in `text` (`?` being one of the configured
/// separators), then an optional `HH?MM?SS` somewhere after it.
///
/// `IV_2023_01_02_22_40_50.txt` → 2023-01-02 22:40:50,
/// `scan 2024-06-14.csv` → 2024-06-14 at the configured default time.
pub fn parse_timestamp(text: &str, format: &TimestampFormat) -> Option<NaiveDateTime> {
    let chars: Vec<char> = text.chars().collect();

    let (date_end, [year, month, day]) = (0..chars.len())
        .find_map(|start| match_triplet(&chars, start, 4, &format.separators))?;
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;

    let (hour, minute, second) = (date_end..chars.len())
        .find_map(|start| match_triplet(&chars, start, 2, &format.separators))
        .map(|(_, [h, m, s])| (h, m, s))
        .unwrap_or(format.default_time);

    date.and_hms_opt(hour, minute, second)
}

/// `YYYY_MM_DD_HH_MM_SS`, the form used for labels.
pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format("%Y_%m_%d_%H_%M_%S").to_string()
}

/// Match `<lead digits><sep><2 digits><sep><2 digits>` at `start`. Returns
/// the index one past the match and the three numbers.
fn match_triplet(
    chars: &[char],
    start: usize,
    lead: usize,
    separators: &str,
) -> Option<(usize, [u32; 3])> {
    // The group must not be glued to a preceding digit.
    if start > 0 && chars[start - 1].is_ascii_digit() {
        return None;
    }
    let widths = [lead, 2, 2];
    let mut values = [0u32; 3];
    let mut pos = start;
    for (i, &width) in widths.iter().enumerate() {
        if i > 0 {
            let sep = *chars.get(pos)?;
            if !separators.contains(sep) {
                return None;
            }
            pos += 1;
        }
        let digits = chars.get(pos..pos + width)?;
        if !digits.iter().all(|c| c.is_ascii_digit()) {
            return None;
        }
        values[i] = digits.iter().collect::<String>().parse().ok()?;
        pos += width;
    }
    if chars.get(pos).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((pos, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn date_and_time_from_file_name() {
        let dt = parse_timestamp("IV_2023_01_02_22_40_50.txt", &TimestampFormat::default());
        assert_eq!(dt, Some(at(2023, 1, 2, 22, 40, 50)));
    }

    #[test]
    fn mixed_separators() {
        let dt = parse_timestamp("2024-06-14-12_30_45", &TimestampFormat::default());
        assert_eq!(dt, Some(at(2024, 6, 14, 12, 30, 45)));
    }

    #[test]
    fn date_only_uses_default_time() {
        let dt = parse_timestamp("2024-06-14", &TimestampFormat::default());
        assert_eq!(dt, Some(at(2024, 6, 14, 9, 0, 0)));
    }

    #[test]
    fn custom_separators() {
        let format = TimestampFormat {
            separators: "/-".to_string(),
            ..TimestampFormat::default()
        };
        let dt = parse_timestamp("2024/06/14-12/30/45", &format);
        assert_eq!(dt, Some(at(2024, 6, 14, 12, 30, 45)));
    }

    #[test]
    fn unknown_separator_is_not_a_date() {
        assert_eq!(
            parse_timestamp("2024/06/14 12:30:45", &TimestampFormat::default()),
            None
        );
        assert_eq!(parse_timestamp("no date here", &TimestampFormat::default()), None);
    }

    #[test]
    fn invalid_calendar_date() {
        assert_eq!(parse_timestamp("2024_13_40", &TimestampFormat::default()), None);
    }

    #[test]
    fn formats_label_style() {
        assert_eq!(format_timestamp(at(2024, 6, 14, 12, 30, 45)), "2024_06_14_12_30_45");
    }
}
