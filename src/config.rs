use std::env;

use crate::error::Error;

/// Environment-derived client configuration. The API base URL is the one
/// business-relevant setting; the theme is a persisted UI preference.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_base: String,
    pub theme: Theme,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let api_base = env::var("GHARRY_API_BASE")?;
        let theme = env::var("GHARRY_THEME")
            .map(|value| Theme::parse(&value))
            .unwrap_or(Theme::System);

        Ok(Self { api_base, theme })
    }
}

impl Theme {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "light" => Self::Light,
            "dark" => Self::Dark,
            _ => Self::System,
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt().try_init().ok();
}

#[test]
fn theme_parsing_defaults_to_system() {
    assert_eq!(Theme::parse("light"), Theme::Light);
    assert_eq!(Theme::parse("DARK"), Theme::Dark);
    assert_eq!(Theme::parse("solarized"), Theme::System);
}

#[test]
fn config_reads_the_environment() {
    env::set_var("GHARRY_API_BASE", "https://api.example.com");
    env::set_var("GHARRY_THEME", "dark");

    let config = Config::from_env().unwrap();
    assert_eq!(config.api_base, "https://api.example.com");
    assert_eq!(config.theme, Theme::Dark);
}
