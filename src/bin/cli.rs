use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

const API_URL: &str = "http://localhost:3000";

#[derive(Parser)]
#[command(name = "compress")]
#[command(about = "A CLI client for the compression service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Register a new account")]
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },

    #[command(about = "Log in and print the token pair")]
    Login {
        #[arg(short, long, help = "Email or username")]
        identity: String,
        #[arg(short, long)]
        password: String,
    },

    #[command(about = "Compress one or more images")]
    Image {
        #[arg(required = true, help = "Image files (.jpg/.jpeg/.png/.webp)")]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "medium", help = "low, medium or high")]
        level: String,
        #[arg(short, long, help = "Access token; omit to compress anonymously")]
        token: Option<String>,
    },

    #[command(about = "Compress a PDF")]
    Pdf {
        file: PathBuf,
        #[arg(short, long, default_value = "medium", help = "low, medium or high")]
        level: String,
        #[arg(short, long, help = "Access token; omit to compress anonymously")]
        token: Option<String>,
    },

    #[command(about = "List your compression history")]
    Links {
        #[arg(short, long)]
        token: String,
    },

    #[command(about = "Delete a history entry")]
    Delete {
        id: String,
        #[arg(short, long)]
        token: String,
    },
}

#[derive(Debug, Deserialize)]
struct ArtifactLink {
    id: String,
    url: String,
    #[serde(rename = "compressedAt")]
    compressed_at: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Register {
            name,
            username,
            email,
            password,
        } => register(name, username, email, password).await,
        Commands::Login { identity, password } => login(identity, password).await,
        Commands::Image { files, level, token } => compress_images(files, level, token).await,
        Commands::Pdf { file, level, token } => compress_pdf(file, level, token).await,
        Commands::Links { token } => list_links(token).await,
        Commands::Delete { id, token } => delete_link(id, token).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn register(
    name: String,
    username: String,
    email: String,
    password: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/user/register", API_URL))
        .json(&json!({
            "name": name,
            "username": username,
            "email": email,
            "password": password,
        }))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("Registration failed: {}", response.text().await?).into());
    }

    let body: Value = response.json().await?;
    println!("✅ Account created!");
    println!("   Username: {}", body["user"]["username"]);
    println!("   Email: {}", body["user"]["email"]);

    Ok(())
}

async fn login(identity: String, password: String) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/user/login", API_URL))
        .json(&json!({
            "emailOrUsername": identity,
            "password": password,
        }))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("Login failed: {}", response.text().await?).into());
    }

    let body: Value = response.json().await?;
    println!("✅ Logged in as {}", body["data"]["user"]["username"]);
    println!("   Access token:  {}", body["data"]["accessToken"].as_str().unwrap_or(""));
    println!("   Refresh token: {}", body["data"]["refreshToken"].as_str().unwrap_or(""));

    Ok(())
}

async fn compress_images(
    files: Vec<PathBuf>,
    level: String,
    token: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let mut form = reqwest::multipart::Form::new().text("compressionLevel", level);
    for file in &files {
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or("Invalid file name")?
            .to_string();
        let bytes = tokio::fs::read(file).await?;
        form = form.part(
            "image",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );
    }

    let mut request = client
        .post(format!("{}/image/optimize-img", API_URL))
        .multipart(form);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(format!("Compression failed: {}", response.text().await?).into());
    }

    let body: Value = response.json().await?;
    let links: Vec<ArtifactLink> =
        serde_json::from_value(body["data"]["links"].clone()).unwrap_or_default();

    println!("✅ Compressed {} image(s):", links.len());
    for link in links {
        println!("   {}", link.url);
    }

    Ok(())
}

async fn compress_pdf(
    file: PathBuf,
    level: String,
    token: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or("Invalid file name")?
        .to_string();
    let bytes = tokio::fs::read(&file).await?;

    let form = reqwest::multipart::Form::new()
        .text("compressionLevel", level)
        .part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

    let mut request = client
        .post(format!("{}/pdf/compress-pdf", API_URL))
        .multipart(form);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(format!("Compression failed: {}", response.text().await?).into());
    }

    let body: Value = response.json().await?;
    let data = &body["data"];
    println!("✅ PDF compressed!");
    println!("   URL: {}", data["compressedPdfUrl"].as_str().unwrap_or(""));
    println!(
        "   Size: {} -> {} bytes ({} pages)",
        data["originalFileSize"], data["compressedFileSize"], data["pageCount"]
    );

    Ok(())
}

async fn list_links(token: String) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/user/getlinks", API_URL))
        .bearer_auth(token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("Failed to fetch links: {}", response.text().await?).into());
    }

    let body: Value = response.json().await?;
    let links: Vec<ArtifactLink> =
        serde_json::from_value(body["data"]["links"].clone()).unwrap_or_default();

    if links.is_empty() {
        println!("📭 No compressed files yet.");
        return Ok(());
    }

    println!("\n📋 Compression history ({})\n", links.len());

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("URL"),
        Cell::new("Compressed At"),
    ]));

    for link in links {
        let compressed_at: DateTime<Utc> = link.compressed_at.parse()?;
        let local_time = compressed_at.with_timezone(&Local);

        table.add_row(Row::new(vec![
            Cell::new(&link.id[..8]),
            Cell::new(&link.url),
            Cell::new(&local_time.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]));
    }

    table.printstd();
    println!();

    Ok(())
}

async fn delete_link(id: String, token: String) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let response = client
        .delete(format!("{}/user/links/{}", API_URL, id))
        .bearer_auth(token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("Delete failed: {}", response.text().await?).into());
    }

    println!("✅ Link {} deleted.", id);
    Ok(())
}
