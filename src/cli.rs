use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use crate::provision::DEFAULT_STACK_PREFIX;
use crate::writer::Format;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (`-v`, `-vv`, `-vvv`).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render one EC2 instance and one `Instanceid<name>` output per name.
    Multi(MultiArgs),

    /// Render the web server stack for a new image and create it.
    WebServer(WebServerArgs),

    /// Render every multi-instance template listed in a config file.
    Batch(BatchArgs),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct OutputArgs {
    /// Output format. Defaults to the output file extension, or JSON.
    #[arg(short, long, value_enum)]
    pub format: Option<Format>,

    /// Write the template here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct MultiArgs {
    /// Logical names of the instances. Defaults to instance1..instance4.
    #[arg(value_name = "NAMES")]
    pub names: Vec<String>,

    /// Name of the image id parameter.
    #[arg(long, default_value = "imageid")]
    pub image_parameter: String,

    /// Name of the instance size parameter.
    #[arg(long, default_value = "InstanceSize")]
    pub size_parameter: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct WebServerArgs {
    /// Image id produced by the image build.
    #[arg(value_name = "AMI_ID")]
    pub ami_id: String,

    /// Stack name. Defaults to `testing` plus a timestamp.
    #[arg(long)]
    pub stack_name: Option<String>,

    #[arg(long, default_value = DEFAULT_STACK_PREFIX)]
    pub stack_prefix: String,

    #[arg(long)]
    pub region: Option<String>,

    /// Stack parameter override, `KEY=VALUE`. Can be repeated.
    #[arg(short, long = "parameter")]
    pub parameters: Vec<String>,

    /// Let CloudFormation roll back a failed creation.
    #[arg(long)]
    pub enable_rollback: bool,

    #[arg(long)]
    pub timeout_in_minutes: Option<i32>,

    /// Only render the template, do not create the stack.
    #[arg(long)]
    pub print_only: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct BatchArgs {
    #[arg(short, long, default_value = "./config.yaml")]
    pub config: PathBuf,

    /// Also create a stack for every entry that names one.
    #[arg(long)]
    pub deploy: bool,
}

pub fn get_log_level_from_verbose(verbose_count: u8) -> LevelFilter {
    match verbose_count {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
