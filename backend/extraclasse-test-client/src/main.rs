// src/main.rs

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    url: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Teacher {
    id: String,
    name: String,
    masp: String,
    ch_extra_classe: Option<String>,
}

async fn login(
    client: &Client,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<LoginResponse, Box<dyn Error>> {
    let response = client
        .post(format!("{}/api/session/login", base_url))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await?;
    let status = response.status();
    let body: Value = response.json().await?;
    if status != StatusCode::OK {
        return Err(format!("login as {} failed ({}): {}", username, status, body).into());
    }
    Ok(serde_json::from_value(body)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    let client = Client::new();

    // Test 1: Status page and endpoint
    println!("\n🔍 Checking service status...");
    let status_page = client.get(format!("{}/status", base_url)).send().await?;
    println!("Status page: {}", status_page.status());

    let endpoint = client
        .get(format!("{}/api/config/endpoint", base_url))
        .send()
        .await?
        .json::<EndpointResponse>()
        .await?;
    println!("Data endpoint: {} (loaded from {})", endpoint.url, endpoint.source);

    // Test 2: Supervisor roster
    println!("\n🔍 Signing in as supervisor...");
    let supervisor = login(&client, &base_url, "supervisor", "admin").await?;
    println!("Signed in as {}", supervisor.user["name"]);

    let teachers = client
        .get(format!("{}/api/supervisor/teachers", base_url))
        .bearer_auth(&supervisor.token)
        .send()
        .await?
        .json::<Vec<Teacher>>()
        .await?;
    println!("Roster has {} teacher(s)", teachers.len());

    let form = json!({
        "name": "Professor Teste",
        "masp": "9876543",
        "subject": "História",
        "chRegimeBasico": 4,
        "schedule": { "segunda": { "start": "08:00", "end": "09:00" } }
    });
    let response = client
        .post(format!("{}/api/supervisor/teachers", base_url))
        .bearer_auth(&supervisor.token)
        .json(&form)
        .send()
        .await?;
    if response.status() != StatusCode::CREATED {
        println!("❌ Creating teacher failed: {}", response.text().await?);
        return Ok(());
    }
    let created = response.json::<Teacher>().await?;
    println!(
        "✅ Created {} ({}) masp {} extra-duty {:?}",
        created.name, created.id, created.masp, created.ch_extra_classe
    );

    // Test 3: Teacher report
    println!("\n🔍 Signing in as the new teacher...");
    let teacher = login(&client, &base_url, &created.masp, &created.masp).await?;

    let report = json!({
        "month": "MARÇO",
        "year": 2025,
        "weeks": [{
            "id": "smoke-1",
            "startDate": "2025-03-03",
            "endDate": "2025-03-07",
            "descriptions": ["CONSELHO DE CLASSE", "REGISTRO DE ATA"]
        }]
    });
    let response = client
        .put(format!("{}/api/teacher/report", base_url))
        .bearer_auth(&teacher.token)
        .json(&report)
        .send()
        .await?;
    println!("Save report: {}", response.status());

    // Test 4: Export as supervisor, whose session is still open
    println!("\n🔍 Exporting the report...");
    let response = client
        .get(format!(
            "{}/api/supervisor/reports/{}/export?month=MAR%C3%87O&year=2025",
            base_url, created.id
        ))
        .bearer_auth(&supervisor.token)
        .send()
        .await?;
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    println!("Export: {} {}", response.status(), disposition);
    println!("Document size: {} bytes", response.bytes().await?.len());

    // Cleanup
    let response = client
        .delete(format!("{}/api/supervisor/teachers/{}", base_url, created.id))
        .bearer_auth(&supervisor.token)
        .send()
        .await?;
    println!("\n🧹 Removed test teacher: {}", response.status());

    Ok(())
}
