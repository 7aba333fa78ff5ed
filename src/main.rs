//! Cartoquiz - interactive geography quiz in the terminal.
//!
//! Entry point: argument parsing, the resume prompt, quiz configuration,
//! and the guess loop. All quiz state lives in the library's session; this
//! binary only renders it.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde_json::Value;

use cartoquiz::{
    DATASETS_FILE, Filter, LoadedDataset, ParsedFeatureSet, PresetRegistry, QuizError, QuizEvent,
    QuizEventKind, QuizOverview, QuizSession, QuizStore, build_quiz_info, load_file, load_preset,
    parse_geo_json,
};

/// Default database file in the working directory
const DEFAULT_DB_FILE: &str = "cartoquiz.sqlite";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let registry = PresetRegistry::load_from_file(DATASETS_FILE);
    if args.iter().any(|arg| arg == "--list-presets") {
        if registry.is_empty() {
            println!("No presets configured in {DATASETS_FILE}.");
        } else {
            for preset in &registry.datasets {
                println!("{}", preset.label);
            }
        }
        return ExitCode::SUCCESS;
    }

    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));

    match run(&args, &registry, &db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Value following a `--flag` argument, if present.
fn arg_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

fn run(args: &[String], registry: &PresetRegistry, db_path: &Path) -> Result<(), QuizError> {
    let mut store = QuizStore::open(db_path)?;
    let overview = store.quiz_overview()?;
    let mut session = QuizSession::new(store);

    // Filter feedback is rendered off the bus, the way the map layer and
    // panes consume it, rather than inline in the command handler.
    session
        .bus()
        .subscribe(QuizEventKind::FiltersUpdate, |event| {
            if let QuizEvent::FiltersUpdate(filters) = event {
                if filters.is_empty() {
                    println!("Filters cleared.");
                } else {
                    let rendered: Vec<String> = filters
                        .iter()
                        .map(|filter| format!("{}={}", filter.key, render_value(&filter.value)))
                        .collect();
                    println!("Active filters: {}", rendered.join(", "));
                }
            }
        });

    let wants_new_quiz =
        arg_value(args, "--data").is_some() || arg_value(args, "--preset").is_some();

    let mut resumed = false;
    if !wants_new_quiz
        && let Some(overview) = &overview
    {
        print_overview(overview);
        match read_line("Resume this quiz? [Y/n] ").as_deref().map(str::trim) {
            Some("") | Some("y") | Some("Y") | Some("yes") => {
                resumed = session.resume_existing_quiz()?;
            }
            Some(_) => {}
            None => return Ok(()),
        }
    }

    if !resumed {
        let Some(quiz_info) = configure_quiz(args, registry)? else {
            return Ok(());
        };
        session.start_new_quiz(quiz_info)?;
    }

    guess_loop(&mut session)
}

/// Assemble a new quiz definition from arguments or interactive prompts.
/// `None` means the user bailed out (EOF).
fn configure_quiz(
    args: &[String],
    registry: &PresetRegistry,
) -> Result<Option<cartoquiz::QuizInfo>, QuizError> {
    let dataset = if let Some(path) = arg_value(args, "--data") {
        load_file(Path::new(path))?
    } else if let Some(name) = arg_value(args, "--preset") {
        load_preset(registry, name)?
    } else {
        match choose_dataset(registry)? {
            Some(dataset) => dataset,
            None => return Ok(None),
        }
    };

    let parsed = parse_geo_json(&dataset.text)?;
    println!(
        "Loaded {} feature(s) from {}.",
        parsed.features.len(),
        dataset.data_source
    );

    let match_property = match arg_value(args, "--property") {
        Some(property) => property.to_string(),
        None => match choose_match_property(&parsed) {
            Some(property) => property,
            None => return Ok(None),
        },
    };

    build_quiz_info(&dataset, parsed, &match_property).map(Some)
}

fn choose_dataset(registry: &PresetRegistry) -> Result<Option<LoadedDataset>, QuizError> {
    if registry.is_empty() {
        println!("Enter a path to a GeoJSON file.");
    } else {
        println!("Preset datasets:");
        for (index, preset) in registry.datasets.iter().enumerate() {
            println!("  [{}] {}", index + 1, preset.label);
        }
        println!("Pick a preset number, or enter a path to a GeoJSON file.");
    }
    loop {
        let Some(line) = read_line("dataset> ") else {
            return Ok(None);
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(number) = line.parse::<usize>() {
            match registry.datasets.get(number.wrapping_sub(1)) {
                Some(preset) => return load_preset(registry, &preset.label).map(Some),
                None => {
                    println!("No preset number {number}.");
                    continue;
                }
            }
        }
        return load_file(Path::new(line)).map(Some);
    }
}

fn choose_match_property(parsed: &ParsedFeatureSet) -> Option<String> {
    if parsed.collected_property_values.is_empty() {
        println!("The dataset has no feature properties to quiz on.");
        return None;
    }
    let keys: Vec<&String> = parsed.collected_property_values.keys().collect();
    println!("Quiz on which property?");
    for (index, (key, values)) in parsed.collected_property_values.iter().enumerate() {
        println!("  [{}] {key} ({} distinct values)", index + 1, values.len());
    }
    loop {
        let line = read_line("property> ")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(number) = line.parse::<usize>() {
            match keys.get(number.wrapping_sub(1)) {
                Some(key) => return Some((*key).clone()),
                None => {
                    println!("No property number {number}.");
                    continue;
                }
            }
        }
        if parsed.collected_property_values.contains_key(line) {
            return Some(line.to_string());
        }
        println!("Unknown property {line:?}.");
    }
}

fn guess_loop(session: &mut QuizSession) -> Result<(), QuizError> {
    if let Some(attribution) = session.data_attribution() {
        println!("Data: {attribution}");
    }
    let (guessed, total) = session.progress();
    println!(
        "Quiz on {:?} - {guessed} of {total} guessed. Type guesses, /help for commands.",
        session.match_property().unwrap_or("?")
    );

    loop {
        let Some(line) = read_line("> ") else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(session, command) {
                break;
            }
            continue;
        }

        let matched = session.make_guess(line)?;
        if matched.is_empty() {
            println!("No match.");
            continue;
        }
        let names: Vec<String> = matched
            .iter()
            .filter_map(|feature| session.feature_match_property_value(feature))
            .map(render_value)
            .collect();
        let (guessed, total) = session.progress();
        println!("Correct: {} ({guessed}/{total})", names.join(", "));
        if total > 0 && guessed == total {
            println!("All features guessed - well done!");
            break;
        }
    }

    let (guessed, total) = session.progress();
    println!("{guessed} of {total} guessed. Progress is saved.");
    Ok(())
}

/// Handle a `/command` line. Returns `false` when the loop should end.
fn handle_command(session: &mut QuizSession, command: &str) -> bool {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "help" => {
            println!("  /filter key=value   add a filter");
            println!("  /filters            show active filters");
            println!("  /clear-filters      remove all filters");
            println!("  /values [key]       show filterable properties or one key's values");
            println!("  /guessed            list guessed features");
            println!("  /progress           show progress");
            println!("  /quit               leave (progress is saved)");
        }
        "quit" | "exit" => return false,
        "progress" => {
            let (guessed, total) = session.progress();
            let scope = if session.filters().is_empty() {
                ""
            } else {
                " (filtered)"
            };
            println!("{guessed} of {total} guessed{scope}");
        }
        "guessed" => {
            let guessed = session.filtered_guessed_features();
            if guessed.is_empty() {
                println!("Nothing guessed yet.");
            }
            for feature in guessed {
                if let Some(value) = session.feature_match_property_value(feature) {
                    println!("  {}", render_value(value));
                }
            }
        }
        "filters" => {
            if session.filters().is_empty() {
                println!("No active filters.");
            }
            for filter in session.filters() {
                println!("  {}={}", filter.key, render_value(&filter.value));
            }
        }
        "filter" => {
            let Some((key, value)) = rest.split_once('=') else {
                println!("Usage: /filter key=value");
                return true;
            };
            let mut filters = session.filters().to_vec();
            filters.push(Filter::new(key.trim(), value.trim()));
            session.set_filters(filters);
        }
        "clear-filters" => session.set_filters(Vec::new()),
        "values" => {
            let values = session.property_values_for_filter();
            if rest.is_empty() {
                let keys: Vec<String> = values.keys().cloned().collect();
                println!("Filterable properties: {}", keys.join(", "));
            } else if let Some(values) = values.get(rest) {
                let rendered: Vec<String> = values.iter().map(render_value).collect();
                println!("{rest}: {}", rendered.join(", "));
            } else {
                println!("Unknown property {rest:?}.");
            }
        }
        _ => println!("Unknown command /{name}. Try /help."),
    }
    true
}

fn print_overview(overview: &QuizOverview) {
    println!("In-progress quiz found:");
    println!("  Data source:   {}", overview.data_source);
    println!("  Quiz property: {}", overview.match_property);
    println!(
        "  Guessed:       {} / {}",
        overview.num_guessed, overview.num_features
    );
}

/// Plain rendering for property values: bare strings, JSON for the rest.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Prompt and read one line from stdin. `None` on EOF or a read error.
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
        Err(_) => None,
    }
}

fn print_usage() {
    println!("Usage: cartoquiz [options]");
    println!();
    println!("Options:");
    println!("  --db <path>        Database file (default: {DEFAULT_DB_FILE})");
    println!("  --data <file>      Start a new quiz from a GeoJSON file");
    println!("  --preset <label>   Start a new quiz from a preset in {DATASETS_FILE}");
    println!("  --property <key>   Property to quiz on (skips the prompt)");
    println!("  --list-presets     List configured presets and exit");
    println!("  -h, --help         Show this help");
}
