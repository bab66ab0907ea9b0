//! Executes parsed commands against a plugin manager.

use std::fs;
use std::io::Write;

use serde_json::{Value, json};
use tether_plugins::{
    FetchDescriptor, InstallFromPathOptions, PackageInfo, PluginInfo, PluginManager, VersionRange,
};

use crate::cli::{CliCommand, RunArgs, UninstallArgs};
use crate::errors::AppError;

pub(crate) fn dispatch<W: Write>(
    manager: &PluginManager,
    command: CliCommand,
    stdout: &mut W,
) -> Result<(), AppError> {
    match command {
        CliCommand::Install { name, version } => {
            let info = manager.install(&name, version.as_deref())?;
            report_installed(&info, stdout)
        }
        CliCommand::InstallPath { path, force } => {
            let info = manager.install_from_path(&path, InstallFromPathOptions { force })?;
            report_installed(&info, stdout)
        }
        CliCommand::Uninstall(args) => uninstall(manager, args, stdout),
        CliCommand::List { json } => {
            let plugins = manager.list();
            if json {
                let entries: Vec<Value> = plugins.iter().map(plugin_json).collect();
                write_json(&Value::Array(entries), stdout)
            } else {
                for plugin in plugins {
                    writeln!(stdout, "{}@{}", plugin.name, plugin.version)?;
                }
                Ok(())
            }
        }
        CliCommand::Info { name, range } => {
            let range = range.as_deref().map(VersionRange::parse).transpose()?;
            let info = manager
                .get_info(&name, range.as_ref())
                .ok_or(AppError::NotInstalled { name })?;
            write_json(&plugin_json(&info), stdout)
        }
        CliCommand::Query { name, version } => {
            let package = manager.query_package(&name, version.as_deref())?;
            write_json(&package_json(&package), stdout)
        }
        CliCommand::Run(args) => run_script(manager, args, stdout),
    }
}

fn uninstall<W: Write>(
    manager: &PluginManager,
    args: UninstallArgs,
    stdout: &mut W,
) -> Result<(), AppError> {
    match args.name {
        Some(name) if !args.all => {
            manager.uninstall(&name)?;
            writeln!(stdout, "uninstalled {name}")?;
        }
        _ => {
            manager.uninstall_all()?;
            writeln!(stdout, "uninstalled all plugins")?;
        }
    }
    Ok(())
}

fn run_script<W: Write>(
    manager: &PluginManager,
    args: RunArgs,
    stdout: &mut W,
) -> Result<(), AppError> {
    let code = match (args.code, args.file) {
        (Some(code), _) => code,
        (None, Some(path)) => {
            fs::read_to_string(&path).map_err(|source| AppError::ReadScript { path, source })?
        }
        (None, None) => String::new(),
    };
    let value = manager.run_script(&code)?;
    if !value.is_unit() {
        writeln!(stdout, "{value}")?;
    }
    Ok(())
}

fn report_installed<W: Write>(info: &PluginInfo, stdout: &mut W) -> Result<(), AppError> {
    writeln!(
        stdout,
        "installed {}@{} at {}",
        info.name,
        info.version,
        info.location.display()
    )?;
    Ok(())
}

fn write_json<W: Write>(value: &Value, stdout: &mut W) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *stdout, value).map_err(AppError::Serialise)?;
    writeln!(stdout)?;
    Ok(())
}

fn plugin_json(info: &PluginInfo) -> Value {
    json!({
        "name": info.name,
        "version": info.version.to_string(),
        "location": info.location.display().to_string(),
        "main": info.main,
        "dependencies": info.dependencies,
        "description": info.description,
        "loaded": info.is_loaded(),
    })
}

fn package_json(package: &PackageInfo) -> Value {
    let source = match &package.source {
        FetchDescriptor::Tarball { url, integrity } => {
            json!({ "kind": "tarball", "url": url, "integrity": integrity })
        }
        FetchDescriptor::GitTarball { url, git } => {
            json!({ "kind": "git", "url": url, "repository": git.to_string() })
        }
        FetchDescriptor::Directory(path) => {
            json!({ "kind": "directory", "path": path.display().to_string() })
        }
        FetchDescriptor::Inline(_) => json!({ "kind": "inline" }),
    };
    json!({
        "name": package.name,
        "version": package.version.to_string(),
        "main": package.main,
        "dependencies": package.dependencies,
        "description": package.description,
        "source": source,
    })
}
