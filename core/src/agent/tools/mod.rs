//! Built-in tool implementations.
//!
//! - **get_weather**: canned weather report for a location
//! - **calculator**: safe arithmetic
//! - **get_time**: local date and time
//! - **web_search**: mock or SerpAPI-backed search

pub mod calculator;
pub mod time;
pub mod weather;
pub mod web_search;

pub use calculator::CalculatorTool;
pub use time::TimeTool;
pub use weather::WeatherTool;
pub use web_search::WebSearchTool;
