//! Casebook CLI - evaluate and inspect formulas

use anyhow::{bail, Context, Result};
use casebook_core::{parse_number, Value};
use casebook_formula::postfix;
use casebook_formula::{
    EvalContext, EvaluationStrategy, Formula, FormulaOptions, SimpleContext,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "casebook")]
#[command(author, version, about = "Formula evaluation and inspection tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula and print the result
    Eval {
        /// Formula source
        formula: String,

        /// Variable binding as name=value (repeatable)
        #[arg(short, long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Evaluation strategy
        #[arg(short, long, value_enum, default_value_t = Strategy::Compiled)]
        strategy: Strategy,
    },

    /// Print the generated code for a formula
    Compile {
        /// Formula source
        formula: String,
    },

    /// Print the postfix instruction listing for a formula
    Postfix {
        /// Formula source
        formula: String,
    },

    /// List the variables and functions a formula refers to
    Refs {
        /// Formula source
        formula: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    Compiled,
    Direct,
    Postfix,
}

impl From<Strategy> for EvaluationStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Compiled => EvaluationStrategy::Compiled,
            Strategy::Direct => EvaluationStrategy::Direct,
            Strategy::Postfix => EvaluationStrategy::Postfix,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Eval {
            formula,
            vars,
            strategy,
        } => eval(&formula, &vars, strategy),
        Commands::Compile { formula } => compile(&formula),
        Commands::Postfix { formula } => show_postfix(&formula),
        Commands::Refs { formula } => show_refs(&formula),
    }
}

/// Install a log subscriber when `RUST_LOG` is set, e.g. `RUST_LOG=casebook_formula=debug`
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn eval(source: &str, vars: &[String], strategy: Strategy) -> Result<()> {
    let mut context = SimpleContext::with_standard_functions();
    for binding in vars {
        let (name, value) =
            parse_binding(binding).with_context(|| format!("Invalid --var '{}'", binding))?;
        context = context.with_variable(name, value);
    }

    let formula = Formula::new(source)
        .with_context(Rc::new(context))
        .with_options(FormulaOptions {
            strategy: strategy.into(),
        });
    tracing::debug!(?strategy, "evaluating formula");

    let value = formula
        .run(&EvalContext::new())
        .with_context(|| format!("Failed to evaluate '{}'", source))?;
    println!("{}", display_value(&value));
    Ok(())
}

fn compile(source: &str) -> Result<()> {
    let formula =
        Formula::new(source).with_context(Rc::new(SimpleContext::with_standard_functions()));
    match formula
        .compiled()
        .with_context(|| format!("Failed to compile '{}'", source))?
    {
        Some(compiled) => println!("{}", compiled.code()),
        None => eprintln!("Warning: formula is empty"),
    }
    Ok(())
}

fn show_postfix(source: &str) -> Result<()> {
    let formula = Formula::new(source);
    let Some(expr) = formula
        .parsed()
        .with_context(|| format!("Failed to parse '{}'", source))?
    else {
        eprintln!("Warning: formula is empty");
        return Ok(());
    };

    for (i, instruction) in postfix::flatten(&expr).instructions().iter().enumerate() {
        println!("{:4}  {}", i, instruction);
    }
    Ok(())
}

fn show_refs(source: &str) -> Result<()> {
    let refs = Formula::new(source)
        .references()
        .with_context(|| format!("Failed to parse '{}'", source))?;

    println!("Variables: {}", refs.variables().join(", "));
    println!("Functions: {}", refs.functions().join(", "));
    Ok(())
}

/// Split `name=value` and interpret the value
fn parse_binding(binding: &str) -> Result<(String, Value)> {
    let Some((name, raw)) = binding.split_once('=') else {
        bail!("expected NAME=VALUE");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("variable name is empty");
    }

    let value = match raw {
        "" => Value::Empty,
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        _ => match parse_number(raw) {
            Some(n) => Value::Number(n),
            None => Value::string(raw),
        },
    };
    Ok((name.to_string(), value))
}

/// Printable form; strings are quoted so `""` and empty are distinguishable
fn display_value(value: &Value) -> String {
    match value {
        Value::Empty => "(empty)".to_string(),
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}
