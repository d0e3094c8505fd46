use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use invoice_builder_lib::config::StoreBackend;
use invoice_builder_lib::crypto::base64_decode;
use invoice_builder_lib::service::{CreateLinkRequest, ResolveLinkRequest};
use invoice_builder_lib::{telemetry, AppConfig, InvoiceService, ServiceError};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "invoice-cli", about = "Validate, render and share invoices")]
struct Cli {
  /// SQLite database file; overrides the configured store.
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Check an invoice JSON file and list every problem.
  Validate { file: PathBuf },

  /// Print the formatted totals of an invoice.
  Totals { file: PathBuf },

  /// Write the PDF and/or HTML rendering of an invoice.
  Render {
    file: PathBuf,

    #[arg(long)]
    pdf: Option<PathBuf>,

    #[arg(long)]
    html: Option<PathBuf>,
  },

  /// Store an invoice and print its id.
  Save { file: PathBuf },

  Show { id: String },

  List {
    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = 10)]
    limit: u32,
  },

  Delete { id: String },

  #[command(subcommand)]
  Share(ShareCommand),
}

#[derive(Subcommand, Debug)]
enum ShareCommand {
  /// Store the invoice and create a shareable link for it.
  Create {
    file: PathBuf,

    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    expiry_days: Option<i64>,
  },

  /// Print the invoice behind a link.
  Open {
    link_id: String,

    #[arg(long)]
    password: Option<String>,
  },

  Revoke { link_id: String },
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
  let text = std::fs::read_to_string(path)
    .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
  Ok(serde_json::from_str(&text)?)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Field errors go to stderr one per line; everything else keeps its message.
fn report(err: ServiceError) -> anyhow::Error {
  if let ServiceError::Validation(errors) = &err {
    for e in errors {
      eprintln!("  {}: {}", e.field, e.message);
    }
  }
  anyhow::anyhow!("{err} (status {})", err.status_code())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let mut cfg = AppConfig::load()?;
  if let Some(db) = cli.db {
    cfg.store.backend = Some(StoreBackend::Sqlite);
    cfg.store.path = Some(db);
  }
  telemetry::init_tracing(&cfg.log_level);

  let service = InvoiceService::from_config(&cfg)?;

  match cli.command {
    Command::Validate { file } => {
      let doc = service.validate(&read_json(&file)?).map_err(report)?;
      println!("ok: {} ({} items)", doc.full_invoice_number(), doc.items.len());
    }

    Command::Totals { file } => {
      let doc = service.validate(&read_json(&file)?).map_err(report)?;
      let (totals, formatted) = service.format(&doc);
      print_json(&serde_json::json!({ "formatted": formatted, "raw": totals }))?;
    }

    Command::Render { file, pdf, html } => {
      let out = service.submit(&read_json(&file)?).await.map_err(report)?;

      let pdf_path = pdf.unwrap_or_else(|| PathBuf::from(&out.file_name));
      let bytes = base64_decode(&out.pdf).map_err(|e| anyhow::anyhow!(e))?;
      std::fs::write(&pdf_path, bytes)?;
      println!("pdf: {}", pdf_path.display());

      if let Some(html_path) = html {
        std::fs::write(&html_path, out.html.as_bytes())?;
        println!("html: {}", html_path.display());
      }
      println!("total: {}", out.totals.total);
    }

    Command::Save { file } => {
      let stored = service.save(&read_json(&file)?).await.map_err(report)?;
      println!("{}", stored.id);
    }

    Command::Show { id } => {
      let stored = service.get(&id).await.map_err(report)?;
      print_json(&stored)?;
    }

    Command::List { page, limit } => {
      let listed = service.list(page, limit).await.map_err(report)?;
      for inv in &listed.items {
        println!(
          "{}  {}  {}",
          inv.id,
          inv.document.full_invoice_number(),
          inv.document.buyer.name
        );
      }
      println!(
        "page {} of {} ({} of {} total)",
        listed.page,
        listed.pages,
        listed.items.len(),
        listed.total
      );
    }

    Command::Delete { id } => {
      service.delete(&id).await.map_err(report)?;
      println!("deleted {id}");
    }

    Command::Share(ShareCommand::Create {
      file,
      password,
      expiry_days,
    }) => {
      let created = service
        .create_link(CreateLinkRequest {
          document: read_json(&file)?,
          password,
          expiry_days,
        })
        .await
        .map_err(report)?;
      print_json(&created)?;
    }

    Command::Share(ShareCommand::Open { link_id, password }) => {
      let shared = service
        .resolve_link(ResolveLinkRequest { link_id, password })
        .await
        .map_err(report)?;
      print_json(&shared)?;
    }

    Command::Share(ShareCommand::Revoke { link_id }) => {
      let changed = service
        .links()
        .deactivate(&link_id)
        .await
        .map_err(|e| report(e.into()))?;
      println!("{}", if changed { "revoked" } else { "no active link" });
    }
  }

  Ok(())
}
