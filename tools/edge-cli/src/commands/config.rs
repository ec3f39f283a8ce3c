//! Configuration management commands.

use std::fs;

use anyhow::{bail, Context as _, Result};
use dialoguer::Confirm;
use edge_observability::LogFormat;

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, CONFIG_NAMES};
use crate::context::Context;
use crate::output::format_ttl;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx).await,
        ConfigCommand::Init { force } => init_config(force, ctx).await,
        ConfigCommand::Validate => validate_config(ctx).await,
    }
}

async fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    let policy = &ctx.config.policy;
    ctx.output.info("");
    ctx.output.info("[policy]");
    ctx.output.kv("excluded_prefixes", &policy.excluded_prefixes.join(", "));
    ctx.output.kv(
        "static_asset_prefix",
        &format!("{} ({})", policy.static_asset_prefix, format_ttl(policy.static_asset_ttl_secs)),
    );
    ctx.output.kv(
        "static_prefix",
        &format!("{} ({})", policy.static_prefix, format_ttl(policy.static_ttl_secs)),
    );
    ctx.output.kv(
        "image_prefix",
        &format!("{} ({})", policy.image_prefix, format_ttl(policy.image_ttl_secs)),
    );
    ctx.output.kv("page_ttl", &format_ttl(policy.page_ttl_secs));
    ctx.output.kv("default_country", &policy.default_country);
    if let Some(header) = &policy.country_header {
        ctx.output.kv("country_header", header);
    }
    ctx.output.kv("cacheable_methods", &policy.cacheable_methods.join(", "));

    let transforms = &ctx.config.transforms;
    ctx.output.info("");
    ctx.output.info("[transforms]");
    ctx.output.kv("enabled", &transforms.enabled.to_string());
    ctx.output.kv("image_vary", &transforms.image_vary.to_string());
    ctx.output.kv("html_hints", &transforms.html_hints.to_string());
    for host in &transforms.dns_prefetch {
        ctx.output.list_item(&format!("dns-prefetch {}", host));
    }
    for origin in &transforms.preconnect {
        ctx.output.list_item(&format!("preconnect {}", origin));
    }
    if let Some(href) = &transforms.preload_stylesheet {
        ctx.output.list_item(&format!("preload {}", href));
    }
    ctx.output.kv("minify_css", &transforms.minify_css.to_string());
    ctx.output.kv("minify_js", &transforms.minify_js.to_string());

    let logging = &ctx.config.logging;
    ctx.output.info("");
    ctx.output.info("[logging]");
    ctx.output.kv("level", &logging.level.to_string().to_lowercase());
    let format = match logging.format {
        LogFormat::Json => "json",
        LogFormat::Human => "human",
    };
    ctx.output.kv("format", format);

    Ok(())
}

async fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join(CONFIG_NAMES[0]);

    if config_path.exists() && !force {
        if ctx.output.is_json() {
            bail!(
                "Config file already exists: {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", config_path.display()))
            .default(false)
            .interact()?;

        if !overwrite {
            ctx.output.warn("Config init cancelled");
            return Ok(());
        }
    }

    fs::write(&config_path, generate_default_config())
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    ctx.output.success(&format!("Created: {}", config_path.display()));

    Ok(())
}

async fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    if ctx.config_path.is_none() {
        ctx.output
            .warn("No config file found, validating defaults. Run `edge-cache config init` to create one.");
    }

    let problems = ctx.config.problems();

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "valid": problems.is_empty(),
            "problems": problems,
        }));
    }

    if problems.is_empty() {
        ctx.output.success("Configuration is valid");
        return Ok(());
    }

    for problem in &problems {
        ctx.output.list_item(problem);
    }

    bail!("Configuration has {} error(s)", problems.len());
}
