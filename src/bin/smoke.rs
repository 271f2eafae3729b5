//! Live smoke test against a running server.
//!
//! ```text
//! cargo run --bin dispatch-nearest      # in one terminal
//! cargo run --bin smoke                 # in another
//! ```
//!
//! `BASE_URL` points it somewhere other than `http://localhost:5000`.

use std::process::ExitCode;

use anyhow::{Context, bail, ensure};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};

struct Smoke {
    client: Client,
    base_url: String,
}

impl Smoke {
    fn get(&self, path: &str) -> anyhow::Result<(StatusCode, Value)> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .with_context(|| format!("GET {}", path))?;
        let status = response.status();
        Ok((status, response.json()?))
    }

    fn calculate(&self, payload: &Value) -> anyhow::Result<(StatusCode, Value)> {
        let response = self
            .client
            .post(format!("{}/calculate", self.base_url))
            .json(payload)
            .send()
            .context("POST /calculate")?;
        let status = response.status();
        Ok((status, response.json()?))
    }

    fn health(&self) -> anyhow::Result<()> {
        let (status, body) = self.get("/health")?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        ensure!(status == StatusCode::OK, "health check returned {}", status);
        ensure!(body["status"] == "healthy", "API not healthy");
        Ok(())
    }

    fn home(&self) -> anyhow::Result<()> {
        let (status, body) = self.get("/")?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        ensure!(status == StatusCode::OK, "home endpoint returned {}", status);
        Ok(())
    }

    fn list_stations(&self) -> anyhow::Result<()> {
        let (status, body) = self.get("/stations")?;
        ensure!(status == StatusCode::OK, "list stations returned {}", status);
        for category in ["fire", "police", "hospital"] {
            let count = body
                .get(category)
                .and_then(Value::as_object)
                .map_or(0, |stations| stations.len());
            println!("Found {} {} stations", count, category);
        }
        Ok(())
    }

    fn emergency(&self, category: &str, lat: f64, lng: f64) -> anyhow::Result<()> {
        let payload = json!({"latitude": lat, "longitude": lng, "emergencyType": category});
        let (status, body) = self.calculate(&payload)?;
        if status != StatusCode::OK {
            bail!("{} calculation returned {}: {}", category, status, body);
        }

        println!("  Nearest Unit: {}", body["nearestUnit"]);
        println!("  Distance: {}", body["distance"]);
        println!("  ETA: {}", body["eta"]);
        println!("  Location: {}", body["unitLocation"]);
        println!(
            "  Total Stations: {}",
            body["allStations"].as_object().map_or(0, |s| s.len())
        );

        ensure!(body["success"] == true, "API returned success=false");
        ensure!(body["nearestUnit"].is_string(), "no nearest unit found");
        ensure!(body["distance"].is_string(), "no distance calculated");
        ensure!(body["eta"].is_string(), "no ETA calculated");
        Ok(())
    }

    fn missing_latitude(&self) -> anyhow::Result<()> {
        let (status, _) = self.calculate(&json!({"longitude": 55.2708, "emergencyType": "fire"}))?;
        println!("Missing latitude - Status Code: {}", status);
        ensure!(
            status == StatusCode::BAD_REQUEST,
            "expected 400 for missing latitude, got {}",
            status
        );
        Ok(())
    }
}

fn main() -> ExitCode {
    let base_url =
        std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
    let smoke = Smoke {
        client: Client::new(),
        base_url: base_url.trim_end_matches('/').to_string(),
    };

    type Check = fn(&Smoke) -> anyhow::Result<()>;
    let checks: [(&str, Check); 7] = [
        ("Health Check", Smoke::health),
        ("Home Endpoint", Smoke::home),
        ("List All Stations", Smoke::list_stations),
        ("Calculate Fire Emergency", |s| s.emergency("fire", 25.2048, 55.2708)),
        ("Calculate Police Emergency", |s| s.emergency("police", 25.2656, 55.3125)),
        ("Calculate Hospital Emergency", |s| s.emergency("hospital", 25.2378, 55.3275)),
        ("Error Handling", Smoke::missing_latitude),
    ];

    for (i, (name, check)) in checks.iter().enumerate() {
        println!("\n=== TEST {}: {} ===", i + 1, name);
        if let Err(e) = check(&smoke) {
            println!("\nFAILED: {:#}", e);
            let refused = e.chain().any(|cause| {
                cause
                    .downcast_ref::<reqwest::Error>()
                    .is_some_and(reqwest::Error::is_connect)
            });
            if refused {
                println!("Cannot connect to {}. Start the server first.", smoke.base_url);
            } else {
                println!("Check that GOOGLE_MAPS_APIKEY is set and EmergencyCenters.json exists.");
            }
            return ExitCode::FAILURE;
        }
        println!("passed");
    }

    println!("\nALL TESTS PASSED");
    ExitCode::SUCCESS
}
