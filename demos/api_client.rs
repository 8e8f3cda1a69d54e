/// Example HTTP client demonstrating how to call the ZIP lookup server API
///
/// Run the server first:
/// ```bash
/// cargo run --bin server
/// ```
///
/// Then run this example:
/// ```bash
/// cargo run --example api_client
/// ```

use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct BatchRequest {
    zips: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct Location {
    city: String,
    state: String,
    county: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    zip: String,
    locations: Vec<Location>,
    has_multiple: bool,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum BatchItem {
    Found(LookupResponse),
    Failed { error: String, zip: String },
}

#[derive(Deserialize, Debug)]
struct BatchResponse {
    results: Vec<BatchItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    zip_codes: usize,
    states: usize,
}

#[derive(Deserialize, Debug)]
struct StatesResponse {
    states: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let client = reqwest::Client::new();

    println!("=== ZIP Lookup HTTP API Client Demo ===\n");

    // 1. Health Check
    println!("1. Checking server health...");
    let health_url = format!("{}/health", base_url);
    let health: HealthResponse = client.get(&health_url).send().await?.json().await?;
    println!("   Server status: {}", health.status);
    println!("   ZIP codes: {} across {} states\n", health.zip_codes, health.states);

    // 2. Single Lookup
    println!("2. Looking up a single ZIP code...");
    let lookup_url = format!("{}/api/lookup/90210", base_url);
    match client.get(&lookup_url).send().await {
        Ok(response) => {
            if response.status().is_success() {
                let result: LookupResponse = response.json().await?;
                println!("   ZIP: {}", result.zip);
                for location in &result.locations {
                    println!(
                        "     {}, {} ({})",
                        location.city, location.state, location.county
                    );
                }
                println!("   Multiple locations: {}\n", result.has_multiple);
            } else {
                let error_text = response.text().await?;
                println!("   Error: {}\n", error_text);
            }
        }
        Err(e) => {
            println!("   Request failed: {}\n", e);
        }
    }

    // 3. Batch Lookup
    println!("3. Looking up multiple ZIP codes (batch)...");
    let batch_url = format!("{}/api/batch", base_url);
    let batch_request = BatchRequest {
        zips: vec![
            "90210".to_string(),
            "10001".to_string(),
            "00000".to_string(),
        ],
    };

    match client.post(&batch_url).json(&batch_request).send().await {
        Ok(response) => {
            if response.status().is_success() {
                let result: BatchResponse = response.json().await?;
                for (i, item) in result.results.iter().enumerate() {
                    match item {
                        BatchItem::Found(found) => {
                            let first = found.locations.first();
                            println!(
                                "   [{}] {} - {}",
                                i + 1,
                                found.zip,
                                first
                                    .map(|l| format!("{}, {}", l.city, l.state))
                                    .unwrap_or_default()
                            );
                        }
                        BatchItem::Failed { error, zip } => {
                            println!("   [{}] {} - {}", i + 1, zip, error);
                        }
                    }
                }
                println!();
            } else {
                let error_text = response.text().await?;
                println!("   Error: {}\n", error_text);
            }
        }
        Err(e) => {
            println!("   Request failed: {}\n", e);
        }
    }

    // 4. States
    println!("4. Listing states...");
    let states_url = format!("{}/api/states", base_url);
    let states: StatesResponse = client.get(&states_url).send().await?.json().await?;
    println!("   {} states\n", states.states.len());

    // 5. Get Metrics
    println!("5. Getting server metrics...");
    let metrics_url = format!("{}/api/metrics", base_url);
    let metrics: serde_json::Value = client.get(&metrics_url).send().await?.json().await?;
    println!("   Total requests: {}", metrics["requests"]["total"]);
    println!("   Lookups found: {}", metrics["lookups"]["found"]);
    println!("   Uptime: {}\n", metrics["uptime"]["human"]);

    println!("=== Demo Complete ===");

    Ok(())
}
