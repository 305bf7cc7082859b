use clap::Parser;
use log::info;

use cfn_template_builder::cli::{
    get_log_level_from_verbose, BatchArgs, Cli, Commands, MultiArgs, WebServerArgs,
};
use cfn_template_builder::generate::{
    default_instance_names, multi_instance_template, InstanceParameters,
};
use cfn_template_builder::provision::{self, CreateOptions, Stack};
use cfn_template_builder::writer::{self, Format};
use cfn_template_builder::{config, template, web_server};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Template(#[from] template::Error),

    #[error(transparent)]
    Config(#[from] config::Error),

    #[error(transparent)]
    Writer(#[from] writer::Error),

    #[error(transparent)]
    Provision(#[from] provision::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(get_log_level_from_verbose(cli.verbose))
        .init();

    let result = match cli.command {
        Commands::Multi(args) => multi(args),
        Commands::WebServer(args) => deploy_web_server(args).await,
        Commands::Batch(args) => batch(args).await,
    };

    if let Err(error) = result {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}

fn multi(args: MultiArgs) -> Result<(), Error> {
    let names = if args.names.is_empty() {
        default_instance_names()
    } else {
        args.names
    };
    let parameters = InstanceParameters {
        image: args.image_parameter,
        size: args.size_parameter,
    };

    let template = multi_instance_template(&names, &parameters)?;
    template.validate_references()?;
    writer::write(&template, args.output.output.as_ref(), args.output.format)?;

    return Ok(());
}

async fn deploy_web_server(args: WebServerArgs) -> Result<(), Error> {
    let template = web_server::web_server_template(&args.ami_id)?;
    template.validate_references()?;

    if args.print_only {
        writer::write(&template, args.output.output.as_ref(), args.output.format)?;
        return Ok(());
    }
    if args.output.output.is_some() {
        writer::write(&template, args.output.output.as_ref(), args.output.format)?;
    }

    let parameters = args
        .parameters
        .iter()
        .map(|raw| provision::parse_parameter(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let options = CreateOptions {
        disable_rollback: !args.enable_rollback,
        parameters,
        timeout_in_minutes: args.timeout_in_minutes,
    };

    let stack_name = args.stack_name.unwrap_or_else(|| {
        provision::timestamped_stack_name(&args.stack_prefix, &chrono::Local::now())
    });
    let stack = Stack::new(stack_name, args.region).await?;
    let created = stack
        .provision(&writer::render_text(&template, Format::Json)?, &options)
        .await?;

    println!("{} {}", created.stack_id, created.status);
    return Ok(());
}

async fn batch(args: BatchArgs) -> Result<(), Error> {
    let config = config::parse(&args.config)?;

    for config_entry in config {
        let template =
            multi_instance_template(&config_entry.instance_names, &config_entry.instance_parameters())?;
        template.validate_references()?;
        writer::write(&template, Some(&config_entry.output.location), None)?;

        let stack_name = match (&config_entry.stack_name, args.deploy) {
            (Some(stack_name), true) => stack_name.clone(),
            _ => continue,
        };
        let stack = Stack::new(stack_name, config_entry.region.clone()).await?;
        let created = stack
            .provision(
                &writer::render_text(&template, Format::Json)?,
                &CreateOptions::default(),
            )
            .await?;
        info!("Created {} ({})", created.stack_id, created.status);
    }

    return Ok(());
}
