// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn schema_arg() -> Arg {
    Arg::new("schemapath")
        .long("schemapath")
        .value_name("PATH")
        .help("Schema file to validate against (default: built-in schema)")
}

fn build_cli() -> Command {
    Command::new("prodlisting")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Prodlisting Contributors")
        .about("Keep product package listings in sync with the listings database")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .default_value("db_connections.toml")
                .help("Database profile file"),
        )
        .arg(
            Arg::new("db_path")
                .short('d')
                .long("db-path")
                .global(true)
                .value_name("PATH")
                .help("Database path (overrides the active profile)"),
        )
        .subcommand(
            Command::new("insert")
                .about("Reconcile the database with a listing file")
                .arg(Arg::new("file").required(true).help("Listing file to apply"))
                .arg(
                    Arg::new("commit")
                        .long("commit")
                        .action(ArgAction::SetTrue)
                        .help("Execute the changes instead of only printing them"),
                )
                .arg(
                    Arg::new("print_changes_only")
                        .long("print-changes-only")
                        .action(ArgAction::SetTrue)
                        .help("Print only the statements that change the database"),
                )
                .arg(schema_arg()),
        )
        .subcommand(
            Command::new("generate")
                .about("Write the stored listing of a product to a file")
                .arg(Arg::new("file").required(true).help("Output file"))
                .arg(Arg::new("product").long("product").required(true).help("Product label"))
                .arg(Arg::new("version").long("version").required(true).help("Product version"))
                .arg(Arg::new("variant").long("variant").required(true).help("Product variant")),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a listing file against the schema")
                .arg(Arg::new("file").required(true).help("Listing file to check"))
                .arg(schema_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print errors as JSON"),
                ),
        )
        .subcommand(Command::new("init").about("Initialize the listings database"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("prodlisting.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
