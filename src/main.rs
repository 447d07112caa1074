use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, value_parser};
use log::info;
use osmclean::audit::{self, AuditPass, AuditSettings, StreetNameTables};
use osmclean::{Collection, DocumentStore, Filter, load_json_lines, process_map};
use std::io::Write;
use std::path::{Path, PathBuf};

const DEFAULT_DB_PATH: &str = "osm.mdb";

fn db_arg() -> Arg {
    Arg::new("db")
        .long("db")
        .value_name("PATH")
        .value_parser(value_parser!(PathBuf))
        .default_value(DEFAULT_DB_PATH)
        .help("Document store file")
}

fn cli() -> Command {
    Command::new("osmclean")
        .version("0.1.0")
        .about("Convert OpenStreetMap XML to JSON lines and clean the resulting records")
        .subcommand_required(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .value_name("LEVEL")
                .help("Log level or filter spec (RUST_LOG takes precedence)"),
        )
        .subcommand(
            Command::new("convert")
                .about("Write <input>.json with one shaped document per line")
                .arg(
                    Arg::new("input")
                        .help("Input OSM XML file path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(1),
                )
                .arg(
                    Arg::new("pretty")
                        .short('p')
                        .long("pretty")
                        .action(clap::ArgAction::SetTrue)
                        .help("Pretty-print JSON output"),
                ),
        )
        .subcommand(
            Command::new("import")
                .about("Load a JSON-lines file into the document store")
                .arg(
                    Arg::new("input")
                        .help("JSON-lines file produced by `convert`")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(1),
                )
                .arg(db_arg()),
        )
        .subcommand(
            Command::new("audit")
                .about("Apply data-quality corrections to stored records")
                .arg(db_arg())
                .arg(
                    Arg::new("pass")
                        .long("pass")
                        .value_name("PASS")
                        .value_parser(["streets", "highways", "amenities", "all"])
                        .default_value("streets")
                        .help("Which correction pass to run"),
                )
                .arg(
                    Arg::new("tables")
                        .long("tables")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON street-name tables (default: built-in Bucharest tables)"),
                )
                .arg(
                    Arg::new("city")
                        .long("city")
                        .value_name("NAME")
                        .help("City written to is_in:city on highways"),
                )
                .arg(
                    Arg::new("min-amenity")
                        .long("min-amenity")
                        .value_name("COUNT")
                        .value_parser(value_parser!(usize))
                        .help("Occurrences needed before an amenity value is canonical"),
                ),
        )
        .subcommand(
            Command::new("stats")
                .about("Print tag frequencies of stored records as JSON")
                .arg(db_arg()),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let _logger = osmclean::logging::init_logging(
        matches.get_one::<String>("log-level").map(String::as_str),
    )?;

    match matches.subcommand() {
        Some(("convert", sub)) => {
            let input = required_path(sub, "input")?;
            if !input.exists() {
                anyhow::bail!("Input file does not exist: {}", input.display());
            }
            let summary = process_map(input, sub.get_flag("pretty"))?;
            info!(
                "Wrote {} documents to {}",
                summary.documents_written,
                summary.output_path.display()
            );
        }
        Some(("import", sub)) => {
            let mut store = DocumentStore::open(required_path(sub, "db")?)?;
            load_json_lines(&mut store, required_path(sub, "input")?)?;
        }
        Some(("audit", sub)) => {
            let mut store = DocumentStore::open(required_path(sub, "db")?)?;
            let pass: AuditPass = sub
                .get_one::<String>("pass")
                .map(String::as_str)
                .unwrap_or("streets")
                .parse()?;
            let settings = audit_settings(sub)?;
            info!("Running audit pass '{}'", pass);
            audit::run_audit(&mut store, pass, &settings)?;
        }
        Some(("stats", sub)) => {
            let store = DocumentStore::open(required_path(sub, "db")?)?;
            let records = store.find(&Filter::new())?;
            let tags = audit::count_tags(records.iter().map(|record| &record.doc));
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &tags)?;
            writeln!(stdout)?;
        }
        _ => unreachable!("clap requires a subcommand"),
    }

    Ok(())
}

fn required_path<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    matches
        .get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("Missing argument: {}", name))
}

fn audit_settings(matches: &ArgMatches) -> Result<AuditSettings> {
    let mut settings = AuditSettings::default();
    if let Some(path) = matches.get_one::<PathBuf>("tables") {
        settings.tables = StreetNameTables::from_json_file(path)?;
    }
    if let Some(city) = matches.get_one::<String>("city") {
        settings.city_name = city.clone();
    }
    if let Some(min) = matches.get_one::<usize>("min-amenity") {
        settings.min_amenity_occurrences = *min;
    }
    Ok(settings)
}
