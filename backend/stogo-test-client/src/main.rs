// src/main.rs

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

// Response types
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PayrollSummary {
    input_rows: usize,
    emitted: usize,
    unresolved_employee: usize,
    negative_pay_hours: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PayrollResponse {
    records: Vec<Value>,
    summary: PayrollSummary,
}

#[derive(Debug, Deserialize)]
struct InvoiceSummary {
    input_records: usize,
    already_invoiced: usize,
    surviving: usize,
    main_count: usize,
    secondary_count: usize,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    summary: InvoiceSummary,
}

fn sample_config() -> Value {
    json!({
        "payroll": {
            "rates": {
                "day": { "rate": "58", "pay_code": "Day Rate" },
                "night": { "rate": "63", "pay_code": "Night Rate" }
            },
            "incentives": {
                "enabled": true,
                "expires_on": "2025-12-31",
                "rules": [{
                    "facility_code": "100402",
                    "cost_centers": ["9343"],
                    "shift_type": "Night",
                    "hours": { "start": 19, "end": 7 },
                    "amount": "10",
                    "description": "Cedar Crest night incentive"
                }]
            },
            "id_prefix": "BH"
        },
        "invoice": {
            "fees": { "default_rate": "8.50" },
            "secondary_facility_ids": ["TN-MH1"]
        }
    })
}

fn sample_payroll_inputs() -> Value {
    json!({
        "timecards": [
            {
                "EmployeeID": "N-1001", "FirstName": "Jane", "LastName": "Doe",
                "In-Clocking GUID": "TC-1", "Hours": "12.5",
                "In-Clocking Date": "2025-10-13", "In-Clocking Time": "07:00",
                "Out-Clocking Date": "2025-10-13", "Out-Clocking Time": "19:30",
                "UserShiftAnswer-OutClocking": "Yes",
                "Company": "100402", "Cost Center": "9343"
            },
            {
                "EmployeeID": "N-1001", "FirstName": "Jane", "LastName": "Doe",
                "In-Clocking GUID": "TC-2", "Hours": "12",
                "In-Clocking Date": "2025-10-17", "In-Clocking Time": "19:00",
                "Out-Clocking Date": "2025-10-18", "Out-Clocking Time": "07:00",
                "UserShiftAnswer-OutClocking": "No",
                "Company": "100402", "Cost Center": "9343"
            },
            {
                "EmployeeID": "N-4040", "Hours": "8",
                "In-Clocking Date": "2025-10-14", "Company": "100402"
            }
        ],
        "crosswalk": [{ "EEID": "N-1001", "Employee Number": "BH2001" }],
        "facilities": [{ "Stogo Code": "100402", "TNAA": "TN-CC" }],
        "pay_period_start": "2025-10-12"
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url =
        std::env::var("STOGO_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let client = Client::new();
    let config = sample_config();

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health check response: {:?}", health);

    // Test 2: Payroll generation with inline config
    println!("\n🔍 Testing payroll generation...");
    let payroll = client
        .post(format!("{}/api/payroll/generate", base_url))
        .json(&json!({ "config": config["payroll"], "inputs": sample_payroll_inputs() }))
        .send()
        .await?
        .error_for_status()?
        .json::<PayrollResponse>()
        .await?;
    println!("Payroll summary: {:?}", payroll.summary);
    for record in &payroll.records {
        println!(
            "  {} {} {}h @ {}",
            record["Stogo EID"], record["Pay Code"], record["Pay Hours"], record["Pay Rate"]
        );
    }

    // Test 3: Invoice generation from the payroll just produced, submitted twice
    println!("\n🔍 Testing invoice generation...");
    let invoice = client
        .post(format!("{}/api/invoice/generate", base_url))
        .json(&json!({
            "config": config["invoice"],
            "inputs": {
                "periods": [payroll.records, payroll.records],
                "invoice_date": "2025-10-20"
            }
        }))
        .send()
        .await?
        .error_for_status()?
        .json::<InvoiceResponse>()
        .await?;
    println!("Invoice summary: {:?}", invoice.summary);

    // Test 4: Unknown client without a rule store
    println!("\n🔍 Testing client lookup...");
    let response = client
        .post(format!("{}/api/payroll/generate", base_url))
        .json(&json!({ "client": "unknown-network", "inputs": sample_payroll_inputs() }))
        .send()
        .await?;
    println!("Client lookup status: {}", response.status());
    println!("Client lookup body: {}", response.text().await?);

    Ok(())
}
