//! 모의투자 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # OAuth 로그인 URL 출력 후 콜백 URL 전달
//! simtrade login
//! simtrade callback "http://localhost:3000/login/callback?accessToken=..."
//!
//! # 실시간 시세 감시 (체결 결과 함께 처리)
//! simtrade watch --company 삼성전자
//!
//! # 주문 후 체결 결과 10초 대기
//! simtrade buy 삼성전자 -q 3 --wait 10
//!
//! # 계좌/랭킹 조회
//! simtrade portfolio --format json
//! simtrade ranking
//! ```

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;

use commands::context::ClientContext;
use commands::market::OutputFormat;
use simtrade_core::logging::{init_logging, LogConfig};
use simtrade_core::{ClientConfig, TradeSide};

#[derive(Parser)]
#[command(name = "simtrade")]
#[command(about = "Trading simulator CLI - 실시간 시세 및 모의 주문", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true, default_value = "config/simtrade.toml")]
    config: String,

    /// 디버그 로그와 span 이벤트 출력
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// OAuth 로그인 URL 출력
    Login,

    /// 로그인 콜백 처리 (토큰이 없으면 refresh 쿠키로 재발급)
    Callback {
        /// 콜백 URL 또는 쿼리 문자열
        url: Option<String>,
    },

    /// 로그아웃 (저장된 토큰 삭제)
    Logout,

    /// 실시간 시세 감시
    Watch {
        /// 체결 결과를 함께 처리할 기업명
        #[arg(long)]
        company: Option<String>,

        /// 출력할 최대 종목 수 (0 = 전체)
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// 기업 상세 조회
    Company {
        /// 기업명
        name: String,

        /// 출력 형식 (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// 매수 주문
    Buy {
        /// 기업명
        company: String,

        /// 수량 (최소 1)
        #[arg(short, long, default_value = "1")]
        quantity: u32,

        /// 체결 결과 대기 시간 (초, 0 = 대기 안 함)
        #[arg(long, default_value = "0")]
        wait: u64,
    },

    /// 매도 주문
    Sell {
        /// 기업명
        company: String,

        /// 수량 (최소 1)
        #[arg(short, long, default_value = "1")]
        quantity: u32,

        /// 체결 결과 대기 시간 (초, 0 = 대기 안 함)
        #[arg(long, default_value = "0")]
        wait: u64,
    },

    /// 내 포트폴리오 조회
    Portfolio {
        /// 출력 형식 (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// 자산 랭킹 조회
    Ranking {
        /// 출력 형식 (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// 섹터 테마 조회
    Themes {
        /// 출력 형식 (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = ClientConfig::load(&cli.config)?;

    let log_config = LogConfig::from_settings(&config.logging)
        .verbose(cli.verbose)
        .with_env();
    if let Err(e) = init_logging(log_config) {
        eprintln!("로깅 초기화 실패: {}", e);
    }

    let ctx = ClientContext::new(config)?;

    let result = match cli.command {
        Commands::Login => commands::session::login(&ctx),
        Commands::Callback { url } => commands::session::callback(&ctx, url).await,
        Commands::Logout => commands::session::logout(&ctx),
        Commands::Watch { company, limit } => commands::market::watch(&ctx, company, limit).await,
        Commands::Company { name, format } => {
            commands::market::company(&ctx, name, OutputFormat::parse(&format)?).await
        }
        Commands::Buy {
            company,
            quantity,
            wait,
        } => commands::trade::submit(&ctx, TradeSide::Buy, company, quantity, wait).await,
        Commands::Sell {
            company,
            quantity,
            wait,
        } => commands::trade::submit(&ctx, TradeSide::Sell, company, quantity, wait).await,
        Commands::Portfolio { format } => {
            commands::market::portfolio(&ctx, OutputFormat::parse(&format)?).await
        }
        Commands::Ranking { format } => {
            commands::market::ranking(&ctx, OutputFormat::parse(&format)?).await
        }
        Commands::Themes { format } => {
            commands::market::themes(&ctx, OutputFormat::parse(&format)?).await
        }
    };

    if let Err(e) = &result {
        error!("명령 실행 실패: {:#}", e);
    }
    result
}
