use anyhow::{Context, bail};
use devexec::config::DEFAULT_KEEPALIVE_INTERVAL;
use devexec::session::ssh::{self, ConnectOptions};
use devexec::session::{ConnectionSecurityOptions, spawn_keepalive};
use std::env;
use std::sync::Arc;

fn print_usage() {
    eprintln!(
        "Usage: cargo run --example run_command -- <host> <user> <password> <command>... [--legacy]"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let legacy = args.iter().any(|a| a == "--legacy");
    args.retain(|a| a != "--legacy");
    if args.len() < 4 {
        print_usage();
        bail!("missing arguments");
    }

    let mut options = ConnectOptions::with_password(&args[0], &args[1], &args[2]);
    if legacy {
        options.security = ConnectionSecurityOptions::legacy_compatible();
    }

    let (conn, done) = ssh::connect(&options)
        .await
        .with_context(|| format!("connecting to {}", options.addr()))?;
    let conn = Arc::new(conn);
    let supervisor = spawn_keepalive(&conn, done, DEFAULT_KEEPALIVE_INTERVAL);

    // Commands issued from separate tasks still run one at a time.
    let mut tasks = Vec::new();
    for command in args[3..].iter().cloned() {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            let result = conn.run_command(&command).await;
            (command, result)
        }));
    }

    for task in tasks {
        let (command, result) = task.await?;
        match result {
            Ok(output) => println!("### {command}\n{output}"),
            Err(err) => eprintln!("### {command} failed: {:#}", anyhow::Error::from(err)),
        }
    }

    conn.close().await;
    println!("keepalive stopped: {:?}", supervisor.await?);
    Ok(())
}
