use anyhow::Context;
use blockdb_sql::{SqlConfig, SqlDatabase};
use blockdb_store::{Database, Iteratee, KeyValueReader, KeyValueWriter, KvIterator, Stater};
use colored::Colorize;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let db = SqlDatabase::connect(config)
        .await
        .context("failed to open database")?;

    let result = match cli.command {
        Command::Put(args) => cmd_put(&db, args).await,
        Command::Get(args) => cmd_get(&db, args).await,
        Command::Has(args) => cmd_has(&db, args).await,
        Command::Delete(args) => cmd_delete(&db, args).await,
        Command::Scan(args) => cmd_scan(&db, args).await,
        Command::Stat(args) => cmd_stat(&db, args).await,
    };
    db.close().await?;
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<SqlConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SqlConfig::from_toml_str(&text)?
        }
        None => SqlConfig::default(),
    };
    if let Some(url) = &cli.db {
        config.url = url.clone();
    }
    Ok(config)
}

/// Decode a hex argument, with or without a `0x` prefix.
fn decode_hex(arg: &str) -> anyhow::Result<Vec<u8>> {
    let digits = arg.strip_prefix("0x").unwrap_or(arg);
    hex::decode(digits).with_context(|| format!("invalid hex: {arg}"))
}

async fn cmd_put(db: &SqlDatabase, args: PutArgs) -> anyhow::Result<()> {
    let key = decode_hex(&args.key)?;
    let value = decode_hex(&args.value)?;
    db.put(&key, &value).await?;
    println!(
        "{} Stored {} bytes at {}",
        "✓".green().bold(),
        value.len(),
        db.address(&key)?.to_string().cyan()
    );
    Ok(())
}

async fn cmd_get(db: &SqlDatabase, args: KeyArgs) -> anyhow::Result<()> {
    let key = decode_hex(&args.key)?;
    match db.get(&key).await {
        Ok(value) => println!("{}", hex::encode(value)),
        Err(err) if err.is_not_found() => println!("{}", "not found".yellow()),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

async fn cmd_has(db: &SqlDatabase, args: KeyArgs) -> anyhow::Result<()> {
    let key = decode_hex(&args.key)?;
    if db.has(&key).await? {
        println!("{}", "present".green());
    } else {
        println!("{}", "absent".yellow());
    }
    Ok(())
}

async fn cmd_delete(db: &SqlDatabase, args: KeyArgs) -> anyhow::Result<()> {
    let key = decode_hex(&args.key)?;
    db.delete(&key).await?;
    println!("{} Deleted {}", "✓".green().bold(), args.key.bold());
    Ok(())
}

async fn cmd_scan(db: &SqlDatabase, args: ScanArgs) -> anyhow::Result<()> {
    let prefix = decode_hex(&args.prefix)?;
    let start = decode_hex(&args.start)?;
    let mut iter = db.new_iterator(&prefix, &start)?;

    let mut shown = 0;
    while shown < args.limit && iter.next().await {
        let Some(key) = iter.key().map(hex::encode) else {
            break;
        };
        if args.values {
            let value = iter.value().await?;
            println!("{} {}", key.yellow(), hex::encode(value));
        } else {
            println!("{}", key.yellow());
        }
        shown += 1;
    }
    if let Some(err) = iter.error() {
        let err = err.clone();
        iter.release();
        return Err(err.into());
    }
    iter.release();
    println!("{}", format!("{shown} keys").dimmed());
    Ok(())
}

async fn cmd_stat(db: &SqlDatabase, args: StatArgs) -> anyhow::Result<()> {
    let value = db.stat(&args.property).await?;
    println!("{} = {}", args.property.bold(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_arguments_accept_optional_prefix() {
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(decode_hex("0102").unwrap(), vec![1, 2]);
        assert!(decode_hex("").unwrap().is_empty());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn db_flag_overrides_config_url() {
        let cli = <Cli as clap::Parser>::try_parse_from([
            "blockdb",
            "--db",
            "postgres://localhost/chain",
            "stat",
            "size",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.url, "postgres://localhost/chain");
        assert_eq!(config.max_connections, 10);
    }
}
