use afip_wsaa::security::request_signer::OpensslBackend;
use afip_wsaa::transport::{ServiceEndpoint, SoapTransport, TapeRecorder};
use afip_wsaa::{
    utils, AuthPlacement, AuthenticatedInvoker, AuthenticationClient, Config, ErrorSpec,
    ProfileStore, TicketStore,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

#[derive(Parser)]
#[command(name = "authorize", version, about = "WSAA login tickets for AFIP web services")]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured profiles
    Profiles,
    /// Reuse a stored ticket or log in for a new one
    Login { profile: String, service: String },
    /// Show the valid tickets of a profile
    Tickets { profile: String },
    /// Ask wsfe for the last authorized voucher number
    LastVoucher {
        profile: String,
        #[arg(long, default_value_t = 1)]
        point_of_sale: u32,
        #[arg(long, default_value_t = 11)]
        voucher_type: u32,
    },
}

fn wsfe() -> ServiceEndpoint {
    ServiceEndpoint::new(
        "wsfe",
        "http://ar.gov.afip.dif.FEV1/",
        "https://wswhomo.afip.gov.ar/wsfev1/service.asmx",
        "https://servicios1.afip.gov.ar/wsfev1/service.asmx",
    )
}

fn main() -> Result<()> {
    utils::logging::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };
    config.ensure_dirs()?;
    let profiles = ProfileStore::new(&config);
    let tickets = TicketStore::new(&config);

    match cli.command {
        Commands::Profiles => {
            for (name, environment) in profiles.list()? {
                println!("{}\t{}", name, environment);
            }
        }
        Commands::Login { profile, service } => {
            let profile = profiles.load(&profile)?;
            let ticket = match tickets.load(&profile.name, &service)? {
                Some(ticket) => {
                    info!(profile = %profile.name, service = %service, "reusing stored ticket");
                    ticket
                }
                None => {
                    let transport = TapeRecorder::new(
                        SoapTransport::from_config(&config)?,
                        "wsaa",
                        config.log_dir.clone(),
                    );
                    let client = AuthenticationClient::from_config(&config, transport, OpensslBackend);
                    let ticket = client
                        .authenticate(&profile, &service, config.ticket_ttl_secs)
                        .context("login failed")?;
                    tickets.save(&profile.name, &service, &ticket)?;
                    ticket
                }
            };
            println!("token:   {}", ticket.token());
            println!("sign:    {}", ticket.signature());
            println!("expires: {}", ticket.expires_str());
        }
        Commands::Tickets { profile } => {
            for (service, ticket) in tickets.list(&profile)? {
                println!("{}\t{}", service, ticket.effective_expiration());
            }
        }
        Commands::LastVoucher {
            profile,
            point_of_sale,
            voucher_type,
        } => {
            let profile = profiles.load(&profile)?;
            let ticket = tickets
                .load(&profile.name, "wsfe")?
                .context("no valid wsfe ticket, run `login <profile> wsfe` first")?;
            let transport = TapeRecorder::new(
                SoapTransport::from_config(&config)?,
                "wsfe",
                config.log_dir.clone(),
            );
            let invoker = AuthenticatedInvoker::new(
                transport,
                wsfe(),
                AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"),
            );
            let result = invoker.call(
                &ticket,
                &profile,
                "FECompUltimoAutorizado",
                json!({"PtoVta": point_of_sale, "CbteTipo": voucher_type}),
                &ErrorSpec::record_list("Errors", "Err", "Code", "Msg"),
                None,
            )?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}
