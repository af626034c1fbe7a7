//! Static catalog of the 50 states + DC: postal codes, FIPS codes, display
//! names and the regional stress multiplier each state carries.

pub const STATE_CODE_PREFIX: &str = "US-";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateInfo {
    pub abbr: &'static str,
    pub fips: &'static str,
    pub name: &'static str,
    /// Regional economic-stress differential applied to computed indices.
    pub regional_stress: f64,
}

impl StateInfo {
    pub fn code(&self) -> String {
        state_code(self.abbr)
    }
}

const fn state(abbr: &'static str, fips: &'static str, name: &'static str, regional_stress: f64) -> StateInfo {
    StateInfo {
        abbr,
        fips,
        name,
        regional_stress,
    }
}

/// Ordered by FIPS code, the order BLS and Census report them in.
pub const STATES: [StateInfo; 51] = [
    state("AL", "01", "Alabama", 1.25),
    state("AK", "02", "Alaska", 1.08),
    state("AZ", "04", "Arizona", 1.10),
    state("AR", "05", "Arkansas", 1.22),
    state("CA", "06", "California", 1.12),
    state("CO", "08", "Colorado", 1.02),
    state("CT", "09", "Connecticut", 1.02),
    state("DE", "10", "Delaware", 1.00),
    state("DC", "11", "District of Columbia", 1.18),
    state("FL", "12", "Florida", 1.15),
    state("GA", "13", "Georgia", 1.10),
    state("HI", "15", "Hawaii", 1.20),
    state("ID", "16", "Idaho", 1.05),
    state("IL", "17", "Illinois", 1.05),
    state("IN", "18", "Indiana", 1.04),
    state("IA", "19", "Iowa", 0.92),
    state("KS", "20", "Kansas", 1.00),
    state("KY", "21", "Kentucky", 1.18),
    state("LA", "22", "Louisiana", 1.30),
    state("ME", "23", "Maine", 0.95),
    state("MD", "24", "Maryland", 1.00),
    state("MA", "25", "Massachusetts", 1.02),
    state("MI", "26", "Michigan", 1.08),
    state("MN", "27", "Minnesota", 0.90),
    state("MS", "28", "Mississippi", 1.35),
    state("MO", "29", "Missouri", 1.05),
    state("MT", "30", "Montana", 1.00),
    state("NE", "31", "Nebraska", 0.95),
    state("NV", "32", "Nevada", 1.12),
    state("NH", "33", "New Hampshire", 0.88),
    state("NJ", "34", "New Jersey", 1.05),
    state("NM", "35", "New Mexico", 1.18),
    state("NY", "36", "New York", 1.10),
    state("NC", "37", "North Carolina", 1.08),
    state("ND", "38", "North Dakota", 0.85),
    state("OH", "39", "Ohio", 1.06),
    state("OK", "40", "Oklahoma", 1.15),
    state("OR", "41", "Oregon", 1.05),
    state("PA", "42", "Pennsylvania", 1.02),
    state("RI", "44", "Rhode Island", 0.98),
    state("SC", "45", "South Carolina", 1.15),
    state("SD", "46", "South Dakota", 0.88),
    state("TN", "47", "Tennessee", 1.12),
    state("TX", "48", "Texas", 1.05),
    state("UT", "49", "Utah", 1.02),
    state("VT", "50", "Vermont", 0.92),
    state("VA", "51", "Virginia", 0.98),
    state("WA", "53", "Washington", 1.02),
    state("WV", "54", "West Virginia", 1.28),
    state("WI", "55", "Wisconsin", 0.95),
    state("WY", "56", "Wyoming", 0.95),
];

pub fn state_code(abbr: &str) -> String {
    format!("{STATE_CODE_PREFIX}{abbr}")
}

/// `"US-CA"` -> `"CA"`; anything without the prefix is returned unchanged.
pub fn abbr_of(code: &str) -> &str {
    code.strip_prefix(STATE_CODE_PREFIX).unwrap_or(code)
}

pub fn by_abbr(abbr: &str) -> Option<&'static StateInfo> {
    STATES.iter().find(|info| info.abbr == abbr)
}

/// Accepts unpadded codes (`"6"`) as the Census API sometimes returns them.
pub fn by_fips(fips: &str) -> Option<&'static StateInfo> {
    let padded = format!("{:0>2}", fips.trim());
    STATES.iter().find(|info| info.fips == padded)
}
