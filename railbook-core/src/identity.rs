use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

/// CCCD (12-digit national ID) structure:
/// - digits 0..3: province code, 001..096
/// - digit 3: century + gender (0/1 = 1900s M/F, 2/3 = 2000s, 4/5 = 2100s,
///   6/7 = 2200s, 8/9 = 2300s; even = male, odd = female)
/// - digits 4..6: two-digit year within that century
/// - digits 6..12: random serial (not validated here)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CccdInfo {
    pub province: u16,
    pub gender: Gender,
    pub birth_year: i32,
    pub age: i32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("CCCD must be exactly 12 digits")]
    NotTwelveDigits,
    #[error("Invalid province code: {0:03}")]
    BadProvince(u16),
    #[error("Birth year {0} is in the future")]
    FutureBirthYear(i32),
    #[error("Birth year {0} is before 1900")]
    BirthYearTooOld(i32),
    #[error("Derived age {0} is outside [0, 150]")]
    ImplausibleAge(i32),
    #[error("Age {age} is below the group minimum of {min}")]
    BelowGroupMinimum { age: i32, min: i32 },
    #[error("Age {age} is above the group maximum of {max}")]
    AboveGroupMaximum { age: i32, max: i32 },
}

/// Parse and validate a CCCD against a fixed `current_year`.
/// Pure function of its inputs; the wall-clock entry point is
/// [`validate_cccd_now`].
pub fn validate_cccd(id: &str, current_year: i32) -> Result<CccdInfo, IdentityError> {
    if id.len() != 12 || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentityError::NotTwelveDigits);
    }

    let province: u16 = id[0..3].parse().map_err(|_| IdentityError::NotTwelveDigits)?;
    if !(1..=96).contains(&province) {
        return Err(IdentityError::BadProvince(province));
    }

    let century_gender = id.as_bytes()[3] - b'0';
    let century_base = 1900 + (century_gender as i32 / 2) * 100;
    let gender = if century_gender % 2 == 0 {
        Gender::Male
    } else {
        Gender::Female
    };

    let year_in_century: i32 = id[4..6].parse().map_err(|_| IdentityError::NotTwelveDigits)?;
    let birth_year = century_base + year_in_century;

    if birth_year > current_year {
        return Err(IdentityError::FutureBirthYear(birth_year));
    }
    if birth_year < 1900 {
        return Err(IdentityError::BirthYearTooOld(birth_year));
    }

    let age = current_year - birth_year;
    if !(0..=150).contains(&age) {
        return Err(IdentityError::ImplausibleAge(age));
    }

    Ok(CccdInfo {
        province,
        gender,
        birth_year,
        age,
    })
}

/// Validate a CCCD and additionally check the derived age against a
/// passenger group's [min, max] window. Open-ended when a bound is None.
pub fn validate_cccd_for_group(
    id: &str,
    min_age: Option<i32>,
    max_age: Option<i32>,
    current_year: i32,
) -> Result<CccdInfo, IdentityError> {
    let info = validate_cccd(id, current_year)?;
    if let Some(min) = min_age {
        if info.age < min {
            return Err(IdentityError::BelowGroupMinimum { age: info.age, min });
        }
    }
    if let Some(max) = max_age {
        if info.age > max {
            return Err(IdentityError::AboveGroupMaximum { age: info.age, max });
        }
    }
    Ok(info)
}

/// Wall-clock entry point used by the booking paths.
pub fn validate_cccd_now(id: &str) -> Result<CccdInfo, IdentityError> {
    validate_cccd(id, Utc::now().year())
}

pub fn validate_cccd_for_group_now(
    id: &str,
    min_age: Option<i32>,
    max_age: Option<i32>,
) -> Result<CccdInfo, IdentityError> {
    validate_cccd_for_group(id, min_age, max_age, Utc::now().year())
}
