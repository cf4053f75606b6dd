//! Countries, region aggregates and their API region codes.

use serde::{Deserialize, Serialize};

/// A region aggregate understood by the offers API.
#[derive(Debug, Clone, Copy)]
pub struct RegionDef {
    /// Selection key (e.g., "usa", "europe").
    pub key: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Region code sent to the offers API (e.g., "US", "EU").
    pub api_code: &'static str,
    /// ISO 3166 alpha-2 codes of member countries.
    pub countries: &'static [&'static str],
}

/// A single selectable country.
#[derive(Debug, Clone, Copy)]
pub struct CountryDef {
    /// ISO 3166 alpha-2 code.
    pub code: &'static str,
    /// Human-readable name.
    pub name: &'static str,
}

// =============================================================================
// Region membership
// =============================================================================

pub static US_COUNTRIES: &[&str] = &["US", "CA"];

pub static EU_COUNTRIES: &[&str] = &[
    "DE", "FR", "GB", "NL", "SE", "FI", "NO", "PL", "ES", "IT", "PT", "BE", "IE", "AT", "CH",
    "CZ", "BG", "RO",
];

pub static ASIA_COUNTRIES: &[&str] = &["JP", "KR", "SG", "IN", "TW", "HK", "TH", "VN", "MY", "ID"];

pub static SA_COUNTRIES: &[&str] = &["BR", "AR", "CL", "CO", "PE", "UY"];

pub static OCEANIA_COUNTRIES: &[&str] = &["AU", "NZ"];

/// Region aggregates, in display order.
pub static REGIONS: &[RegionDef] = &[
    RegionDef { key: "usa", name: "United States & Canada", api_code: "US", countries: US_COUNTRIES },
    RegionDef { key: "europe", name: "Europe", api_code: "EU", countries: EU_COUNTRIES },
    RegionDef { key: "asia", name: "Asia Pacific", api_code: "ASIA", countries: ASIA_COUNTRIES },
    RegionDef { key: "south_america", name: "South America", api_code: "SA", countries: SA_COUNTRIES },
    RegionDef { key: "oceania", name: "Oceania", api_code: "OC", countries: OCEANIA_COUNTRIES },
];

/// Selectable countries.
pub static COUNTRIES: &[CountryDef] = &[
    // North America
    CountryDef { code: "US", name: "United States" },
    CountryDef { code: "CA", name: "Canada" },
    // Europe
    CountryDef { code: "DE", name: "Germany" },
    CountryDef { code: "FR", name: "France" },
    CountryDef { code: "GB", name: "United Kingdom" },
    CountryDef { code: "NL", name: "Netherlands" },
    CountryDef { code: "SE", name: "Sweden" },
    CountryDef { code: "FI", name: "Finland" },
    CountryDef { code: "NO", name: "Norway" },
    CountryDef { code: "PL", name: "Poland" },
    CountryDef { code: "ES", name: "Spain" },
    CountryDef { code: "IT", name: "Italy" },
    CountryDef { code: "PT", name: "Portugal" },
    CountryDef { code: "BE", name: "Belgium" },
    CountryDef { code: "IE", name: "Ireland" },
    CountryDef { code: "AT", name: "Austria" },
    CountryDef { code: "CH", name: "Switzerland" },
    CountryDef { code: "CZ", name: "Czechia" },
    CountryDef { code: "BG", name: "Bulgaria" },
    CountryDef { code: "RO", name: "Romania" },
    // Asia Pacific
    CountryDef { code: "JP", name: "Japan" },
    CountryDef { code: "KR", name: "South Korea" },
    CountryDef { code: "SG", name: "Singapore" },
    CountryDef { code: "IN", name: "India" },
    CountryDef { code: "TW", name: "Taiwan" },
    CountryDef { code: "HK", name: "Hong Kong" },
    CountryDef { code: "TH", name: "Thailand" },
    CountryDef { code: "VN", name: "Vietnam" },
    CountryDef { code: "MY", name: "Malaysia" },
    CountryDef { code: "ID", name: "Indonesia" },
    // South America
    CountryDef { code: "BR", name: "Brazil" },
    CountryDef { code: "AR", name: "Argentina" },
    CountryDef { code: "CL", name: "Chile" },
    CountryDef { code: "CO", name: "Colombia" },
    CountryDef { code: "PE", name: "Peru" },
    CountryDef { code: "UY", name: "Uruguay" },
    // Oceania
    CountryDef { code: "AU", name: "Australia" },
    CountryDef { code: "NZ", name: "New Zealand" },
];

/// A user-selected location: one country or a whole region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    /// A single country.
    Country {
        /// ISO 3166 alpha-2 code.
        code: String,
        /// Display name.
        name: String,
    },
    /// A region aggregate.
    Region {
        /// Region key from [`REGIONS`].
        key: String,
        /// Display name.
        name: String,
        /// Member country codes.
        countries: Vec<String>,
    },
}

impl Location {
    /// Look up a country by ISO code (case-insensitive).
    #[must_use]
    pub fn country(code: &str) -> Option<Self> {
        find_country(code).map(|c| Self::Country {
            code: c.code.to_string(),
            name: c.name.to_string(),
        })
    }

    /// Look up a region aggregate by key (case-insensitive).
    #[must_use]
    pub fn region(key: &str) -> Option<Self> {
        find_region(key).map(|r| Self::Region {
            key: r.key.to_string(),
            name: r.name.to_string(),
            countries: r.countries.iter().map(ToString::to_string).collect(),
        })
    }

    /// Resolve user input: region keys win over country codes.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        Self::region(input).or_else(|| Self::country(input))
    }

    /// Uniqueness key within a selection.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Country { code, .. } => code.clone(),
            Self::Region { key, .. } => format!("region:{key}"),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Country { name, .. } | Self::Region { name, .. } => name,
        }
    }

    /// Whether this location is a region aggregate.
    #[must_use]
    pub fn is_region(&self) -> bool {
        matches!(self, Self::Region { .. })
    }

    /// API region codes covered by this location.
    fn region_codes(&self) -> Vec<&'static str> {
        match self {
            Self::Country { code, .. } => region_for_country(code)
                .map(|r| vec![r.api_code])
                .unwrap_or_default(),
            Self::Region { key, countries, .. } => match find_region(key) {
                Some(region) => vec![region.api_code],
                None => countries
                    .iter()
                    .filter_map(|c| region_for_country(c).map(|r| r.api_code))
                    .collect(),
            },
        }
    }
}

/// Find a region definition by key.
#[must_use]
pub fn find_region(key: &str) -> Option<&'static RegionDef> {
    REGIONS.iter().find(|r| r.key.eq_ignore_ascii_case(key))
}

/// Find a country definition by code.
#[must_use]
pub fn find_country(code: &str) -> Option<&'static CountryDef> {
    COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

/// The region a country belongs to.
#[must_use]
pub fn region_for_country(code: &str) -> Option<&'static RegionDef> {
    REGIONS
        .iter()
        .find(|r| r.countries.iter().any(|c| c.eq_ignore_ascii_case(code)))
}

/// Map a selection to the de-duplicated API region codes, in first-seen order.
///
/// Locations outside every known region contribute nothing.
#[must_use]
pub fn locations_to_region_codes(locations: &[Location]) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in locations.iter().flat_map(Location::region_codes) {
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }
    codes
}
