use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the gateway router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate health (unauthenticated)
    Health,
    /// Gateway status
    Status,
    /// Healthy instances per service
    Services,
    /// Register an instance
    Register {
        service: String,
        host: String,
        port: u16,
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove an instance
    Deregister { service: String, id: String },
    /// Run one selection for a service
    Route { service: String },
    /// Circuit breaker inspection and overrides
    Breakers {
        #[command(subcommand)]
        command: BreakerCommands,
    },
    /// Show or change the load-balancing strategy
    Strategy {
        /// round-robin, least-connections, random or weighted
        name: Option<String>,
    },
    /// Selection statistics
    Stats {
        /// Clear statistics (one instance with --instance)
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        instance: Option<String>,
    },
}

#[derive(Subcommand)]
enum BreakerCommands {
    /// All breakers with their statistics
    List,
    /// Targets whose breaker is open
    Open,
    /// Force one breaker: open, close or half-open
    Set {
        service: String,
        instance: String,
        action: String,
    },
    /// Force every breaker open
    OpenAll,
    /// Force every breaker closed
    CloseAll,
    /// Drop every breaker
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, body) = match cli.command {
        Commands::Health => (Method::GET, "/health".to_string(), None),
        Commands::Status => (Method::GET, "/admin/status".to_string(), None),
        Commands::Services => (Method::GET, "/admin/services".to_string(), None),
        Commands::Register {
            service,
            host,
            port,
            id,
        } => (
            Method::POST,
            format!("/admin/services/{}/instances", service),
            Some(json!({ "id": id, "host": host, "port": port })),
        ),
        Commands::Deregister { service, id } => (
            Method::DELETE,
            format!("/admin/services/{}/instances/{}", service, id),
            None,
        ),
        Commands::Route { service } => (Method::GET, format!("/admin/route/{}", service), None),
        Commands::Breakers { command } => match command {
            BreakerCommands::List => (Method::GET, "/admin/breakers".to_string(), None),
            BreakerCommands::Open => (Method::GET, "/admin/breakers/open".to_string(), None),
            BreakerCommands::Set {
                service,
                instance,
                action,
            } => (
                Method::POST,
                format!("/admin/breakers/{}/{}/{}", service, instance, action),
                None,
            ),
            BreakerCommands::OpenAll => (Method::POST, "/admin/breakers/open-all".to_string(), None),
            BreakerCommands::CloseAll => (Method::POST, "/admin/breakers/close-all".to_string(), None),
            BreakerCommands::Reset => (Method::POST, "/admin/breakers/reset".to_string(), None),
        },
        Commands::Strategy { name: None } => (Method::GET, "/admin/strategy".to_string(), None),
        Commands::Strategy { name: Some(name) } => (
            Method::PUT,
            "/admin/strategy".to_string(),
            Some(json!({ "strategy": name })),
        ),
        Commands::Stats {
            reset: false,
            instance: _,
        } => (Method::GET, "/admin/stats".to_string(), None),
        Commands::Stats {
            reset: true,
            instance,
        } => {
            let path = match instance {
                Some(id) => format!("/admin/stats?instance={}", id),
                None => "/admin/stats".to_string(),
            };
            (Method::DELETE, path, None)
        }
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url, path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
    }
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }

    if status.is_success() {
        Ok(())
    } else {
        Err(format!("request failed with status {}", status).into())
    }
}
