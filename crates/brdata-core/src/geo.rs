// Calendar and federative-unit lookup tables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Brazilian federative units, identified by their two-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BrazilState {
    #[serde(rename = "AC")]
    Acre,
    #[serde(rename = "AL")]
    Alagoas,
    #[serde(rename = "AP")]
    Amapa,
    #[serde(rename = "AM")]
    Amazonas,
    #[serde(rename = "BA")]
    Bahia,
    #[serde(rename = "CE")]
    Ceara,
    #[serde(rename = "DF")]
    DistritoFederal,
    #[serde(rename = "ES")]
    EspiritoSanto,
    #[serde(rename = "GO")]
    Goias,
    #[serde(rename = "MA")]
    Maranhao,
    #[serde(rename = "MT")]
    MatoGrosso,
    #[serde(rename = "MS")]
    MatoGrossoDoSul,
    #[serde(rename = "MG")]
    MinasGerais,
    #[serde(rename = "PA")]
    Para,
    #[serde(rename = "PB")]
    Paraiba,
    #[serde(rename = "PR")]
    Parana,
    #[serde(rename = "PE")]
    Pernambuco,
    #[serde(rename = "PI")]
    Piaui,
    #[serde(rename = "RJ")]
    RioDeJaneiro,
    #[serde(rename = "RN")]
    RioGrandeDoNorte,
    #[serde(rename = "RS")]
    RioGrandeDoSul,
    #[serde(rename = "RO")]
    Rondonia,
    #[serde(rename = "RR")]
    Roraima,
    #[serde(rename = "SC")]
    SantaCatarina,
    #[serde(rename = "SP")]
    SaoPaulo,
    #[serde(rename = "SE")]
    Sergipe,
    #[serde(rename = "TO")]
    Tocantins,
}

impl BrazilState {
    pub const ALL: [BrazilState; 27] = [
        BrazilState::Acre,
        BrazilState::Alagoas,
        BrazilState::Amapa,
        BrazilState::Amazonas,
        BrazilState::Bahia,
        BrazilState::Ceara,
        BrazilState::DistritoFederal,
        BrazilState::EspiritoSanto,
        BrazilState::Goias,
        BrazilState::Maranhao,
        BrazilState::MatoGrosso,
        BrazilState::MatoGrossoDoSul,
        BrazilState::MinasGerais,
        BrazilState::Para,
        BrazilState::Paraiba,
        BrazilState::Parana,
        BrazilState::Pernambuco,
        BrazilState::Piaui,
        BrazilState::RioDeJaneiro,
        BrazilState::RioGrandeDoNorte,
        BrazilState::RioGrandeDoSul,
        BrazilState::Rondonia,
        BrazilState::Roraima,
        BrazilState::SantaCatarina,
        BrazilState::SaoPaulo,
        BrazilState::Sergipe,
        BrazilState::Tocantins,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            BrazilState::Acre => "AC",
            BrazilState::Alagoas => "AL",
            BrazilState::Amapa => "AP",
            BrazilState::Amazonas => "AM",
            BrazilState::Bahia => "BA",
            BrazilState::Ceara => "CE",
            BrazilState::DistritoFederal => "DF",
            BrazilState::EspiritoSanto => "ES",
            BrazilState::Goias => "GO",
            BrazilState::Maranhao => "MA",
            BrazilState::MatoGrosso => "MT",
            BrazilState::MatoGrossoDoSul => "MS",
            BrazilState::MinasGerais => "MG",
            BrazilState::Para => "PA",
            BrazilState::Paraiba => "PB",
            BrazilState::Parana => "PR",
            BrazilState::Pernambuco => "PE",
            BrazilState::Piaui => "PI",
            BrazilState::RioDeJaneiro => "RJ",
            BrazilState::RioGrandeDoNorte => "RN",
            BrazilState::RioGrandeDoSul => "RS",
            BrazilState::Rondonia => "RO",
            BrazilState::Roraima => "RR",
            BrazilState::SantaCatarina => "SC",
            BrazilState::SaoPaulo => "SP",
            BrazilState::Sergipe => "SE",
            BrazilState::Tocantins => "TO",
        }
    }
}

impl fmt::Display for BrazilState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown state code: '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for BrazilState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        BrazilState::ALL
            .iter()
            .copied()
            .find(|state| state.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Calendar month, always within 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month(u8);

impl Month {
    pub const JANUARY: Month = Month(1);
    pub const DECEMBER: Month = Month(12);

    pub fn new(number: u32) -> Option<Self> {
        if (1..=12).contains(&number) {
            Some(Month(number as u8))
        } else {
            None
        }
    }

    pub fn number(&self) -> u32 {
        u32::from(self.0)
    }

    /// Zero-padded form used in source file names ("03").
    pub fn str_number(&self) -> String {
        format!("{:02}", self.0)
    }

    pub fn all() -> impl Iterator<Item = Month> {
        (1..=12).map(Month)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_str() {
        assert_eq!("SP".parse::<BrazilState>().unwrap(), BrazilState::SaoPaulo);
        assert_eq!(" df ".parse::<BrazilState>().unwrap(), BrazilState::DistritoFederal);
        assert!("XX".parse::<BrazilState>().is_err());
    }

    #[test]
    fn test_state_codes_are_unique() {
        let mut codes: Vec<_> = BrazilState::ALL.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 27);
    }

    #[test]
    fn test_state_serde_uses_code() {
        let json = serde_json::to_string(&BrazilState::MatoGrossoDoSul).unwrap();
        assert_eq!(json, "\"MS\"");
        let parsed: BrazilState = serde_json::from_str("\"GO\"").unwrap();
        assert_eq!(parsed, BrazilState::Goias);
    }

    #[test]
    fn test_month_bounds() {
        assert!(Month::new(0).is_none());
        assert!(Month::new(13).is_none());
        assert_eq!(Month::new(3).unwrap().to_string(), "3");
        assert_eq!(Month::new(3).unwrap().str_number(), "03");
        assert_eq!(Month::all().count(), 12);
    }
}
