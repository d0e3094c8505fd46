use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::document::{DateFormat, Language};
use crate::error::FormatError;

/// Reads `YYYY-MM-DD` or an RFC 3339 timestamp. A timestamp contributes the calendar date as
/// written; it is not shifted into another zone.
pub fn parse_calendar_date(input: &str) -> Result<Date, FormatError> {
    let s = input.trim();
    if let Ok(d) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Ok(d);
    }
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(ts.date());
    }
    Err(FormatError::InvalidDate(input.to_string()))
}

pub fn iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Long localized form, e.g. `March 1, 2024` or `1. März 2024`. Unknown languages read as English.
pub fn format_date(date: &str, language: &str) -> Result<String, FormatError> {
    let parsed = parse_calendar_date(date)?;
    Ok(format_long_date(parsed, Language::from_code_or_default(language)))
}

pub fn format_long_date(date: Date, language: Language) -> String {
    let month = month_name(language, u8::from(date.month()));
    let (d, y) = (date.day(), date.year());
    match language {
        Language::En => format!("{month} {d}, {y}"),
        Language::De | Language::Da | Language::Fi | Language::No => format!("{d}. {month} {y}"),
        Language::Es | Language::Pt => format!("{d} de {month} de {y}"),
        Language::Fr | Language::It | Language::Nl | Language::Pl | Language::Sv => {
            format!("{d} {month} {y}")
        }
    }
}

pub fn format_date_with(date: Date, format: DateFormat) -> String {
    let (y, m, d) = (date.year(), u8::from(date.month()), date.day());
    match format {
        DateFormat::Iso => format!("{y:04}-{m:02}-{d:02}"),
        DateFormat::DayMonthYear => format!("{d:02}/{m:02}/{y:04}"),
        DateFormat::MonthDayYear => format!("{m:02}/{d:02}/{y:04}"),
    }
}

/// The numeric preference wins when the document sets one.
pub fn format_document_date(date: Date, language: Language, preference: Option<DateFormat>) -> String {
    match preference {
        Some(f) => format_date_with(date, f),
        None => format_long_date(date, language),
    }
}

fn month_name(language: Language, month: u8) -> &'static str {
    // Polish and Finnish use the case that follows a day number.
    const EN: [&str; 12] = [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December",
    ];
    const DE: [&str; 12] = [
        "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August", "September",
        "Oktober", "November", "Dezember",
    ];
    const FR: [&str; 12] = [
        "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
        "octobre", "novembre", "décembre",
    ];
    const ES: [&str; 12] = [
        "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre",
        "octubre", "noviembre", "diciembre",
    ];
    const IT: [&str; 12] = [
        "gennaio", "febbraio", "marzo", "aprile", "maggio", "giugno", "luglio", "agosto",
        "settembre", "ottobre", "novembre", "dicembre",
    ];
    const NL: [&str; 12] = [
        "januari", "februari", "maart", "april", "mei", "juni", "juli", "augustus", "september",
        "oktober", "november", "december",
    ];
    const PT: [&str; 12] = [
        "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto", "setembro",
        "outubro", "novembro", "dezembro",
    ];
    const PL: [&str; 12] = [
        "stycznia", "lutego", "marca", "kwietnia", "maja", "czerwca", "lipca", "sierpnia",
        "września", "października", "listopada", "grudnia",
    ];
    const SV: [&str; 12] = [
        "januari", "februari", "mars", "april", "maj", "juni", "juli", "augusti", "september",
        "oktober", "november", "december",
    ];
    const DA: [&str; 12] = [
        "januar", "februar", "marts", "april", "maj", "juni", "juli", "august", "september",
        "oktober", "november", "december",
    ];
    const FI: [&str; 12] = [
        "tammikuuta", "helmikuuta", "maaliskuuta", "huhtikuuta", "toukokuuta", "kesäkuuta",
        "heinäkuuta", "elokuuta", "syyskuuta", "lokakuuta", "marraskuuta", "joulukuuta",
    ];
    const NO: [&str; 12] = [
        "januar", "februar", "mars", "april", "mai", "juni", "juli", "august", "september",
        "oktober", "november", "desember",
    ];

    let table = match language {
        Language::En => &EN,
        Language::De => &DE,
        Language::Fr => &FR,
        Language::Es => &ES,
        Language::It => &IT,
        Language::Nl => &NL,
        Language::Pt => &PT,
        Language::Pl => &PL,
        Language::Sv => &SV,
        Language::Da => &DA,
        Language::Fi => &FI,
        Language::No => &NO,
    };
    table[usize::from(month.clamp(1, 12)) - 1]
}

pub(crate) mod serde_iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::iso_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_calendar_date(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod serde_iso_date_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Option<Date>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&super::iso_date(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Date>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => super::parse_calendar_date(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn english_long_form() {
        assert_eq!(format_date("2024-03-01", "en").unwrap(), "March 1, 2024");
    }

    #[test]
    fn localized_long_forms() {
        let d = date!(2024 - 03 - 15);
        assert_eq!(format_long_date(d, Language::De), "15. März 2024");
        assert_eq!(format_long_date(d, Language::Fr), "15 mars 2024");
        assert_eq!(format_long_date(d, Language::Es), "15 de marzo de 2024");
        assert_eq!(format_long_date(d, Language::Pl), "15 marca 2024");
        assert_eq!(format_long_date(d, Language::Fi), "15. maaliskuuta 2024");
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        assert_eq!(format_date("2024-12-24", "xx").unwrap(), "December 24, 2024");
    }

    #[test]
    fn invalid_input_is_an_error_not_a_string() {
        assert_eq!(
            format_date("not a date", "en"),
            Err(FormatError::InvalidDate("not a date".into()))
        );
        assert!(format_date("2024-02-30", "en").is_err());
    }

    #[test]
    fn timestamp_keeps_its_calendar_date() {
        // late evening west of UTC must not roll over to the next day
        assert_eq!(
            parse_calendar_date("2024-03-01T23:30:00-08:00").unwrap(),
            date!(2024 - 03 - 01)
        );
        assert_eq!(
            parse_calendar_date("2024-03-01T00:30:00+09:00").unwrap(),
            date!(2024 - 03 - 01)
        );
    }

    #[test]
    fn numeric_preferences() {
        let d = date!(2024 - 07 - 04);
        assert_eq!(format_date_with(d, DateFormat::Iso), "2024-07-04");
        assert_eq!(format_date_with(d, DateFormat::DayMonthYear), "04/07/2024");
        assert_eq!(format_date_with(d, DateFormat::MonthDayYear), "07/04/2024");
        assert_eq!(
            format_document_date(d, Language::De, None),
            "4. Juli 2024"
        );
    }
}
