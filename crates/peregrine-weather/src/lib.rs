//! # peregrine-weather
//!
//! Weather lookup boundary for the Peregrine session engine.
//!
//! The engine consumes the [`provider::ForecastProvider`] trait: a
//! location plus an ISO date range in, a pre-formatted natural-language
//! report out. Raw provider JSON never crosses this boundary — the
//! [`openweather::OpenWeatherClient`] deserializes into typed
//! observations and [`report`] renders them into text before anything
//! is returned to the caller.

#![deny(unsafe_code)]

pub mod openweather;
pub mod provider;
pub mod report;

pub use openweather::{OpenWeatherClient, OpenWeatherConfig};
pub use provider::{ForecastProvider, ForecastQuery, WeatherError};
