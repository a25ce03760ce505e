// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Command line helper to pin keys and try sealed exchanges.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use http_envelope::{
    key_manager::fingerprint, pipeline::ErrorBody, Body, EnvelopeClientBuilder, EnvelopeConfig,
    Error, OutgoingRequest,
};
use log::info;
use reqwest::Method;

#[derive(Parser)]
#[command(name = "envelope-tool")]
#[command(bin_name = "envelope-tool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    operation: Operation,

    /// Envelope config path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level, `debug` when the config enables envelope diagnostics
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
#[command(author, version, about, long_about = None)]
enum Operation {
    /// Print the pin hash of a PEM public key
    Fingerprint(FingerprintArgs),

    /// Run the key lifecycle and report the outcome
    Check,

    /// Send one sealed request and print the opened answer
    Send(SendArgs),
}

#[derive(Args)]
#[command(author, version, about, long_about = None)]
struct FingerprintArgs {
    /// path to the file which contains the PEM public key
    #[arg(short, long)]
    pem_file: String,
}

#[derive(Args)]
#[command(author, version, about, long_about = None)]
struct SendArgs {
    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Target url
    #[arg(short, long)]
    url: String,

    /// JSON body of the request
    #[arg(short, long)]
    data: Option<String>,
}

fn print_body(body: &Body) {
    match body {
        Body::Empty => {}
        Body::Json(payload) => println!("{payload:#}"),
        Body::Text(text) => println!("{text}"),
    }
}

fn init_logger(level: Option<&str>, debug: bool) {
    let default_level = level.unwrap_or(if debug { "debug" } else { "info" });
    env_logger::init_from_env(Env::new().default_filter_or(default_level));
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Operation::Fingerprint(op_args) = &args.operation {
        init_logger(args.log_level.as_deref(), false);
        let pem = tokio::fs::read_to_string(&op_args.pem_file)
            .await
            .expect("read pem file");
        println!("{}", fingerprint(&pem));
        return;
    }

    let config = EnvelopeConfig::new(args.config).expect("failed to initialize envelope config");
    init_logger(args.log_level.as_deref(), config.debug);

    let client = EnvelopeClientBuilder::new(config)
        .build()
        .expect("failed to build envelope client");
    let readiness = client.initialize().await;

    match args.operation {
        Operation::Fingerprint(_) => {}
        Operation::Check => {
            let manager = client.key_manager();
            println!("state: {}", manager.state());
            match readiness {
                Ok(readiness) => {
                    info!("key lifecycle settled: {readiness:?}");
                    if let Some(key) = manager.active_key() {
                        println!("origin: {}", key.origin);
                        println!("fingerprint: {}", key.fingerprint);
                    }
                }
                Err(e) => {
                    println!("error: {e}");
                    println!("set `enabled = false` to run without payload encryption");
                    std::process::exit(1);
                }
            }
        }
        Operation::Send(op_args) => {
            readiness.expect("failed to initialize envelope encryption");
            let method = Method::from_bytes(op_args.method.to_uppercase().as_bytes())
                .expect("invalid http method");
            let mut request = OutgoingRequest::new(method, op_args.url);
            if let Some(data) = op_args.data {
                let payload = serde_json::from_str(&data).expect("data is not valid JSON");
                request = request.with_json(payload);
            }

            match client.send(request).await {
                Ok(response) => {
                    println!("{} {}", response.status.as_u16(), response.status_text);
                    print_body(&response.body);
                }
                Err(Error::Status(err)) => {
                    println!("{} {}", err.status.as_u16(), err.status_text);
                    match &err.body {
                        ErrorBody::Opened { payload, .. } => println!("{payload:#}"),
                        ErrorBody::Plain(body) => print_body(body),
                    }
                    std::process::exit(1);
                }
                Err(e) => panic!("failed to send request: {e}"),
            }
        }
    }
}
