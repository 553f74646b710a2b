use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::agent::tool::{required_str, Tool, ToolParameter};
use crate::error::Result;

/// Canned weather report; there is no live provider behind it
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather information for a location"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new("location", "string", "City name or location")]
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<Value> {
        let location = required_str(params, "location", self.name())?;
        Ok(json!({
            "location": location,
            "temperature": "22°C",
            "conditions": "Sunny",
            "humidity": "65%",
            "wind_speed": "15 km/h",
            "source": "weather_api"
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AideError;

    #[tokio::test]
    async fn test_weather_report() {
        let params = json!({"location": "Tokyo"});
        let report = WeatherTool.execute(params.as_object().unwrap()).await.unwrap();
        assert_eq!(report["location"], "Tokyo");
        assert_eq!(report["temperature"], "22°C");
        assert_eq!(report["source"], "weather_api");
    }

    #[tokio::test]
    async fn test_location_required() {
        let err = WeatherTool.execute(&Map::new()).await.unwrap_err();
        assert!(matches!(err, AideError::InvalidToolArguments { .. }));
        assert_eq!(err.to_string(), "Location parameter is required");
    }
}
