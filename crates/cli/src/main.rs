use anyhow::{Context, Result};
use calcsql::meta::{EntityGenMeta, EntityMeta};
use calcsql::{micro_calc_to_sql, CalcLayout, ModelMeta, ReadLayout, TranslateOptions};
use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use config::Config;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::{debug, error};

/// Microdata calculation to SQL translator
#[derive(Parser, Debug)]
#[command(name = "microcalc")]
#[command(about = "Translate microdata calculations into SQL", long_about = None)]
struct Args {
    /// Translate a single calculation and exit
    #[arg(short, long)]
    exec: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Model metadata JSON file, overrides metadata.path
    #[arg(short, long)]
    model: Option<String>,

    /// Entity name, overrides metadata.entity
    #[arg(long)]
    entity: Option<String>,

    /// Read layout JSON file with base run id, filters and order by
    #[arg(short, long)]
    layout: Option<String>,

    /// Comma separated attribute names to group by
    #[arg(short, long, value_delimiter = ',')]
    group_by: Option<Vec<String>>,

    /// Comma separated variant run ids
    #[arg(short, long, value_delimiter = ',')]
    run_ids: Option<Vec<i32>>,
}

/// Everything a translation needs, changed by REPL commands
struct Session {
    model: ModelMeta,
    entity: String,
    generation: Option<String>,
    read: ReadLayout,
    calc_id: i32,
    group_by: Vec<String>,
    run_ids: Vec<i32>,
    options: TranslateOptions,
}

impl Session {
    fn new(args: &Args, config: &Config) -> Result<Self> {
        let model_path = args.model.as_deref().unwrap_or(&config.metadata.path);
        let model = ModelMeta::from_json_file(model_path)?;

        let entity = match (&args.entity, config.metadata.entity.is_empty()) {
            (Some(name), _) => name.clone(),
            (None, false) => config.metadata.entity.clone(),
            (None, true) => model
                .entities
                .first()
                .map(|e| e.name.clone())
                .with_context(|| format!("No entities found in model: {}", model.name))?,
        };

        let read = match &args.layout {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read layout file: {}", path))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse layout file: {}", path))?
            }
            None => config.read_layout(),
        };

        debug!(model = %model.name, entity = %entity, from_id = read.from_id, "session created");

        Ok(Self {
            model,
            entity,
            generation: config.metadata.generation.clone(),
            read,
            calc_id: config.query.calc_id,
            group_by: args
                .group_by
                .clone()
                .unwrap_or_else(|| config.query.group_by.clone()),
            run_ids: args
                .run_ids
                .clone()
                .unwrap_or_else(|| config.query.run_ids.clone()),
            options: config.translate_options(),
        })
    }

    fn translate(&self, expr: &str) -> Result<String> {
        let calc = CalcLayout {
            calculate: expr.to_string(),
            calc_id: self.calc_id,
            name: "calc".to_string(),
        };
        micro_calc_to_sql(
            &self.model,
            &self.entity,
            self.generation.as_deref(),
            &self.read,
            &calc,
            &self.group_by,
            &self.run_ids,
            &self.options,
        )
    }

    fn entity_and_gen(&self) -> Result<(&EntityMeta, &EntityGenMeta)> {
        let entity = self
            .model
            .entity_by_name(&self.entity)
            .with_context(|| format!("Entity not found: {}", self.entity))?;
        let generation = self
            .model
            .entity_gen(entity.entity_hid, self.generation.as_deref())
            .with_context(|| format!("Entity generation not found for entity: {}", self.entity))?;
        Ok((entity, generation))
    }

    /// Run a backslash command, false if the command is unknown
    fn command(&mut self, line: &str) -> Result<bool> {
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match cmd {
            "\\h" => print_help(),
            "\\a" => println!("{}", self.attributes_table()?),
            "\\p" => println!("{}", self.parameters_table()),
            "\\s" => self.print_settings(),
            "\\e" => {
                self.model
                    .entity_by_name(arg)
                    .with_context(|| format!("Entity not found: {}", arg))?;
                self.entity = arg.to_string();
                self.generation = None;
            }
            "\\g" => self.group_by = split_list(arg).map(String::from).collect(),
            "\\r" => {
                self.run_ids = split_list(arg)
                    .map(|s| s.parse().with_context(|| format!("Invalid run id: {}", s)))
                    .collect::<Result<_>>()?
            }
            "\\f" => {
                self.read.from_id = arg
                    .parse()
                    .with_context(|| format!("Invalid run id: {}", arg))?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn attributes_table(&self) -> Result<Table> {
        let (entity, generation) = self.entity_and_gen()?;

        let mut table = new_table(&["Name", "Type", "Column", "Numeric"]);
        for a in generation.attributes(entity)? {
            let t = self.model.type_by_id(a.type_id);
            table.add_row(vec![
                Cell::new(&a.name),
                Cell::new(t.map(|t| t.name.as_str()).unwrap_or("?")),
                Cell::new(&a.col_name),
                Cell::new(t.map(|t| t.is_numeric()).unwrap_or(false)),
            ]);
        }
        Ok(table)
    }

    fn parameters_table(&self) -> Table {
        let mut table = new_table(&["Hid", "Name", "Rank", "Type", "Table"]);
        for p in &self.model.params {
            let t = self.model.type_by_id(p.type_id);
            table.add_row(vec![
                Cell::new(p.param_hid),
                Cell::new(&p.name),
                Cell::new(p.rank),
                Cell::new(t.map(|t| t.name.as_str()).unwrap_or("?")),
                Cell::new(&p.db_run_table),
            ]);
        }
        table
    }

    fn print_settings(&self) {
        println!("Model:      {}", self.model.name);
        println!("Entity:     {}", self.entity);
        println!(
            "Generation: {}",
            self.generation.as_deref().unwrap_or("(first)")
        );
        println!("Base run:   {}", self.read.from_id);
        println!("Runs:       {:?}", self.run_ids);
        println!("Group by:   {:?}", self.group_by);
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::DynamicFullWidth);
    table.set_header(header.iter().map(Cell::new).collect::<Vec<_>>());
    table
}

fn main() -> Result<()> {
    // Set RUST_LOG environment variable to control log level
    // Example: RUST_LOG=calcsql=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
                .add_directive("rustyline=error".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    config.validate()?;

    let mut session = Session::new(&args, &config)?;

    if let Some(expr) = &args.exec {
        println!("{}", session.translate(expr)?);
        return Ok(());
    }

    println!("Microdata calculation REPL");
    println!("Type 'exit' or 'quit' to exit, '\\h' for help\n");

    let history_file = get_history_file_path();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    if history_file.exists() {
        rl.load_history(&history_file)
            .context("Failed to load history file")?;
    }

    loop {
        let readline = rl.readline("microcalc> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    save_history(&mut rl, &history_file);
                    println!("Goodbye!");
                    break;
                }

                if line.starts_with('\\') {
                    match session.command(line) {
                        Ok(true) => {}
                        Ok(false) => eprintln!("Unknown command: {}, '\\h' for help", line),
                        Err(e) => eprintln!("Error: {:#}", e),
                    }
                    continue;
                }

                match session.translate(line) {
                    Ok(sql) => println!("{}\n", sql),
                    Err(e) => {
                        error!("Translation failed: {:#}", e);
                        eprintln!("Error: {:#}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                save_history(&mut rl, &history_file);
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                save_history(&mut rl, &history_file);
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                save_history(&mut rl, &history_file);
                error!("Readline error: {:?}", err);
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn get_history_file_path() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        home.join(".microcalc_history")
    } else {
        PathBuf::from(".microcalc_history")
    }
}

fn save_history(rl: &mut DefaultEditor, history_file: &PathBuf) {
    use tracing::warn;
    rl.save_history(history_file)
        .context("Failed to save history file")
        .unwrap_or_else(|e| {
            warn!("Could not save history: {}", e);
            eprintln!("Warning: Could not save history: {}", e);
        });
}

fn print_help() {
    println!("Microdata calculation REPL Help:");
    println!("  exit, quit      - Exit the REPL");
    println!("  \\h              - Show this help message");
    println!("  \\s              - Show current settings");
    println!("  \\a              - List attributes of current entity generation");
    println!("  \\p              - List model parameters");
    println!("  \\e <entity>     - Use another entity");
    println!("  \\g <a, b>       - Group by attributes, empty to clear");
    println!("  \\r <id, id>     - Variant run ids, empty to clear");
    println!("  \\f <id>         - Base run id");
    println!("  <calculation>   - Translate a calculation into SQL");
    println!("\nExample calculations:");
    println!("  OM_AVG(Income)");
    println!("  OM_SUM(Income - 0.5 * OM_AVG(Pension))");
    println!("  OM_AVG(Income[variant] - Income[base])");
    println!("  OM_AVG(Salary * param.BaseSalary)");
}
