use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use txprobe::controller::run::RunConfig;
use txprobe::controller::Controller;
use txprobe::driver::web::{WebConfig, WebSession};
use txprobe::store::{fields, KvStore};
use txprobe::utils::config::Pacing;
use txprobe::{agent, report};

#[derive(Parser)]
#[command(name = "txprobe")]
#[command(version = "0.1.0")]
#[command(about = "Drives a verification form through test submissions and replays transaction ids into the debug lookup", long_about = None)]
struct Cli {
    /// Path to the persistent store file
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a run from a YAML config file
    Run {
        /// Path to the run config (interfaceUrl, debugUrl, testCases, ...)
        config: PathBuf,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Connect to an existing browser over CDP (e.g. http://localhost:9222)
        #[arg(long)]
        cdp_endpoint: Option<String>,

        /// Leave the browser (and its tabs) open after the run
        #[arg(long)]
        keep_browser: bool,

        /// Also write the finished run as a JSON report
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List cached runs
    History {
        /// How many runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Emit the cached current run as JSON
    Report {
        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage field value lists, custom fields, and picker data
    Fields {
        #[command(subcommand)]
        command: FieldsCommands,
    },
}

#[derive(Subcommand)]
enum FieldsCommands {
    /// Show configured value lists (one field or all)
    List { field: Option<String> },

    /// Add a value to a field's list
    Add { field: String, value: String },

    /// Remove a value from a field's list
    Remove { field: String, value: String },

    /// Restore a field's list to the built-in defaults
    Reset { field: String },

    /// Define a custom DOM field by selector
    AddCustom {
        /// Element id or CSS selector of the control
        selector: String,
        /// Display label (also used as lookup hint)
        label: String,
        /// Storage key; derived from the selector when omitted
        #[arg(long)]
        key: Option<String>,
    },

    /// Remove a custom field definition and its values
    RemoveCustom { key: String },

    /// Add an entry to the "field to test" list
    AddTestable { key: String, label: String },

    /// Remove an entry from the "field to test" list
    RemoveTestable { key: String },

    /// Add a country to the picker list
    AddCountry { name: String },

    /// Remove a country from the picker list
    RemoveCountry { name: String },

    /// Scrape a select's visible option labels from a live page
    ScrapeOptions {
        /// Page to open
        url: String,
        /// Element id of the select
        select: String,
        /// Append the scraped labels to this field's value list
        #[arg(long)]
        add_to: Option<String>,
        /// Run the browser headless
        #[arg(long)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let store = KvStore::new(cli.store.unwrap_or_else(KvStore::default_path));

    match cli.command {
        Commands::Run {
            config,
            headless,
            cdp_endpoint,
            keep_browser,
            report: report_path,
        } => {
            let run_config = RunConfig::from_yaml_file(&config)?;

            println!(
                "{} Running from: {}",
                "▶".green().bold(),
                config.display()
            );
            println!("  Interface: {}", run_config.interface_url.cyan());
            println!("  Debug:     {}", run_config.debug_url.cyan());
            println!("  Country:   {}", run_config.country.cyan());
            println!("  Field:     {}", run_config.field_to_test.cyan());
            if keep_browser {
                println!("  Browser:   {}", "kept open after the run".yellow());
            }

            let countries = fields::load_countries(&store).await;
            if !countries.iter().any(|c| c == &run_config.country) {
                log::warn!(
                    "country '{}' is not in the configured list {:?}",
                    run_config.country,
                    countries
                );
            }

            let mut web = WebConfig::default();
            if headless {
                web.headless = true;
            }
            if cdp_endpoint.is_some() {
                web.cdp_endpoint = cdp_endpoint;
            }
            web.keep_browser = keep_browser;

            let session = WebSession::launch(web).await?;
            let mut controller = Controller::new(session, store.clone(), Pacing::default());
            let record = controller.start_run(run_config).await?;

            report::print_summary(&record);
            if let Some(path) = report_path {
                report::write_json(&record, &path)?;
            }
        }

        Commands::History { limit } => {
            report::print_history(&store, limit).await?;
        }

        Commands::Report { output } => {
            report::generate_report(&store, output.as_deref()).await?;
        }

        Commands::Fields { command } => {
            handle_fields_command(&store, command).await?;
        }
    }

    Ok(())
}

async fn handle_fields_command(store: &KvStore, command: FieldsCommands) -> anyhow::Result<()> {
    match command {
        FieldsCommands::List { field } => {
            let values = fields::load_field_values(store).await;
            match field {
                Some(field) => {
                    let list = values.get(&field).cloned().unwrap_or_default();
                    println!("{}: {}", field.cyan(), list.join(", "));
                }
                None => {
                    for (field, list) in &values {
                        println!("{}: {}", field.cyan(), list.join(", "));
                    }
                    let custom = fields::load_custom_fields(store).await;
                    for (key, meta) in &custom {
                        println!(
                            "{} ({}): custom, selector {}",
                            key.cyan(),
                            meta.label,
                            meta.selector.dimmed()
                        );
                    }
                }
            }
        }

        FieldsCommands::Add { field, value } => {
            let list = fields::add_value(store, &field, &value).await?;
            println!("{} {}: {}", "✓".green(), field.cyan(), list.join(", "));
        }

        FieldsCommands::Remove { field, value } => {
            let list = fields::remove_value(store, &field, &value).await?;
            println!("{} {}: {}", "✓".green(), field.cyan(), list.join(", "));
        }

        FieldsCommands::Reset { field } => {
            let list = fields::reset_field(store, &field).await?;
            println!("{} {}: {}", "✓".green(), field.cyan(), list.join(", "));
        }

        FieldsCommands::AddCustom {
            selector,
            label,
            key,
        } => {
            let key = key.unwrap_or_else(|| fields::derive_key_from_selector(&selector));
            if key.is_empty() {
                anyhow::bail!("could not derive a key from selector '{selector}'");
            }
            let selector = if selector.starts_with('#') || selector.starts_with('.') {
                selector
            } else {
                format!("#{selector}")
            };
            fields::add_custom_field(store, &key, &label, &selector).await?;
            println!("{} custom field {} ({selector})", "✓".green(), key.cyan());
        }

        FieldsCommands::RemoveCustom { key } => {
            fields::remove_custom_field(store, &key).await?;
            println!("{} removed custom field {}", "✓".green(), key.cyan());
        }

        FieldsCommands::AddTestable { key, label } => {
            let list = fields::add_testable_field(store, &key, &label).await?;
            print_testable(&list);
        }

        FieldsCommands::RemoveTestable { key } => {
            let list = fields::remove_testable_field(store, &key).await?;
            print_testable(&list);
        }

        FieldsCommands::AddCountry { name } => {
            let list = fields::add_country(store, &name).await?;
            println!("{} countries: {}", "✓".green(), list.join(", "));
        }

        FieldsCommands::RemoveCountry { name } => {
            let list = fields::remove_country(store, &name).await?;
            println!("{} countries: {}", "✓".green(), list.join(", "));
        }

        FieldsCommands::ScrapeOptions {
            url,
            select,
            add_to,
            headless,
        } => {
            let mut web = WebConfig::default();
            if headless {
                web.headless = true;
            }
            let session = WebSession::launch(web).await?;
            let tab = session.open_tab(&url).await?;
            let options = agent::forms::scrape_select_options(tab.as_ref(), &select).await?;
            println!(
                "{} {} option(s) in {}:",
                "✓".green(),
                options.len(),
                select.cyan()
            );
            for option in &options {
                println!("  {option}");
            }
            if let Some(field) = add_to {
                for option in &options {
                    fields::add_value(store, &field, option).await?;
                }
                println!("{} appended to {}", "✓".green(), field.cyan());
            }
        }
    }
    Ok(())
}

fn print_testable(list: &[fields::TestableField]) {
    println!("{} testable fields:", "✓".green());
    for field in list {
        println!("  {} ({})", field.key.cyan(), field.label);
    }
}
