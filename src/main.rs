use std::path::Path;
use std::time::Instant;

use actix::prelude::*;
use log::LevelFilter;

use netkit::cli;
use netkit::config::SessionConfig;
use netkit::core::builder::{JsonRequestBuilder, RequestBuilder};
use netkit::core::transport::ChallengeDisposition;
use netkit::core::{DataResponseParser, HttpSession, Parameters};
use netkit::ui::{print_error, print_success, ProgressReporter, TransferSummary};
use netkit::utils::validator;
use netkit::utils::{LoggerActor, SessionLog};

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let logger = LoggerActor::new("logs/netkit.log", LevelFilter::Info, 10 * 1024 * 1024)?.start();
    logger.info(&format!(
        "程序启动 (v{}, 构建于 {})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_BUILD_TIMESTAMP")
    ));

    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok(pair) => pair,
        Err(e) => {
            logger.error(&format!("参数解析失败: {}", e));
            eprintln!("参数解析失败: {}", e);
            std::process::exit(1);
        }
    };

    if args.edit {
        if !Path::new(&args.config).exists() {
            SessionConfig::default().save_with_tutorial(&args.config)?;
        }
        cli::open_config_in_editor(&args.config);
        return Ok(());
    }

    let Some(url) = args.url.clone() else {
        eprintln!("缺少 URL，用 --help 查看用法");
        std::process::exit(1);
    };
    if let Err(e) = validator::validate_url(&url) {
        logger.error(&format!("URL 校验失败: {}", e));
        eprintln!("{}", e);
        std::process::exit(1);
    }

    logger.info(&format!("配置文件路径: {}", args.config));
    logger.info(&format!("配置摘要: {}", config.summary()));

    // 命令行凭据接到会话级质询处理器上，只尝试一次
    let mut builder = HttpSession::builder(config);
    if let Some(credential) = args.credential()? {
        builder = builder.on_session_challenge(move |challenge, reply| {
            let disposition = if challenge.previous_failures == 0 {
                ChallengeDisposition::UseCredential(credential.clone())
            } else {
                ChallengeDisposition::PerformDefaultHandling
            };
            let _ = reply.send(disposition);
        });
    }
    let session = builder.start();
    logger.info("会话已启动");

    let parameters = args.parameters()?;
    let started = Instant::now();

    let result = match args.output.clone() {
        Some(output) => run_download(&session, &url, parameters, &output, started, &logger).await,
        None => run_request(&session, &args, &url, parameters, started, &logger).await,
    };

    session.invalidate_and_cancel().await;
    logger.info("程序退出");
    result
}

/// 发一次请求并把响应打印到终端
async fn run_request(
    session: &HttpSession,
    args: &cli::Args,
    url: &str,
    parameters: Option<Parameters>,
    started: Instant,
    logger: &Addr<LoggerActor>,
) -> Result<(), Box<dyn std::error::Error>> {
    let method = args.http_method()?;
    let builder: Option<Box<dyn RequestBuilder>> = if args.json {
        Some(Box::new(JsonRequestBuilder::new()))
    } else {
        None
    };

    match session.request(method, url, parameters, builder, DataResponseParser).await {
        Ok(fetched) => {
            let bytes = fetched.value.unwrap_or_default();
            if fetched.response.mime().contains("json") {
                match serde_json::from_slice::<serde_json::Value>(&bytes) {
                    Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    Err(_) => println!("{}", String::from_utf8_lossy(&bytes)),
                }
            } else {
                println!("{}", String::from_utf8_lossy(&bytes));
            }
            println!(
                "{}",
                TransferSummary {
                    url: url.to_string(),
                    status: fetched.response.status,
                    bytes: bytes.len() as u64,
                    elapsed: started.elapsed(),
                }
            );
            logger.info(&format!("{} {} 完成，状态码 {}", method, url, fetched.response.status));
            Ok(())
        }
        Err(failure) => {
            print_error(&format!("请求失败: {}", failure));
            logger.error(&format!("{} {} 失败: {}", method, url, failure));
            std::process::exit(1);
        }
    }
}

/// 下载到目标路径，带终端进度条
async fn run_download(
    session: &HttpSession,
    url: &str,
    parameters: Option<Parameters>,
    output: &str,
    started: Instant,
    logger: &Addr<LoggerActor>,
) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = ProgressReporter::new("下载中");
    let outcome = session.download(url, parameters, Some(reporter.sink())).await;
    reporter.finish();

    match outcome {
        Ok(fetched) => {
            let location = fetched.value.ok_or("下载结果缺少文件位置")?;
            if let Some(parent) = Path::new(output).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            // 跨文件系统时 rename 会失败，退回复制
            if std::fs::rename(&location, output).is_err() {
                std::fs::copy(&location, output)?;
                let _ = std::fs::remove_file(&location);
            }
            let bytes = std::fs::metadata(output)?.len();
            print_success(&format!("下载完成: {}", output));
            println!(
                "{}",
                TransferSummary {
                    url: url.to_string(),
                    status: fetched.response.status,
                    bytes,
                    elapsed: started.elapsed(),
                }
            );
            logger.info(&format!("下载完成: {} -> {}", url, output));
            Ok(())
        }
        Err(failure) => {
            print_error(&format!("下载失败: {}", failure));
            logger.error(&format!("下载失败: {} - {}", url, failure));
            std::process::exit(1);
        }
    }
}
