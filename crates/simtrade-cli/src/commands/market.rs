//! 시세/계좌 조회 명령.

use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use simtrade_client::CompanyView;
use simtrade_core::PriceSnapshot;

use super::context::ClientContext;
use super::trade::ConsoleNotifier;

/// 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(anyhow::anyhow!("Invalid format: {}. Use: table, json", s)),
        }
    }
}

/// 실시간 시세 감시.
///
/// `company`를 지정하면 해당 기업의 체결 결과도 함께 처리합니다.
pub async fn watch(ctx: &ClientContext, company: Option<String>, limit: usize) -> Result<()> {
    ctx.require_login()?;

    let live = ctx.synchronizer();
    let _scope = live.enter_scope()?;

    if let Err(e) = live.refresh_snapshot(&ctx.api).await {
        warn!("초기 시세 조회 실패: {}", e);
    }

    let _trade_watch = match company {
        Some(name) => {
            let view = Arc::new(CompanyView::new(name, ctx.api.clone()));
            if let Err(e) = view.load().await {
                warn!("기업 정보 조회 실패: {}", e);
            }
            Some(view.watch_trade_results(&live, Arc::new(ConsoleNotifier))?)
        }
        None => None,
    };

    let mut snapshots = live.subscribe_snapshot();
    let mut status = ctx.session.subscribe_status();
    print_snapshot(&live.snapshot(), limit);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot, limit);
            }
            changed = status.changed() => {
                if changed.is_err() || !status.borrow_and_update().is_authenticated() {
                    println!("세션이 종료되었습니다. 다시 로그인하세요.");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("종료 신호 수신");
                break;
            }
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &PriceSnapshot, limit: usize) {
    if snapshot.is_empty() {
        println!("(시세 없음)");
        return;
    }

    let updated = snapshot
        .updated_at
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    println!("\n[{}] {}개 종목 ({:?})", updated, snapshot.len(), snapshot.source);
    println!("{:<20} {:>12} {:>10}", "기업", "현재가", "등락률");

    let take = if limit == 0 { snapshot.len() } else { limit };
    for record in snapshot.records.iter().take(take) {
        println!(
            "{:<20} {:>12} {:>9}%",
            record.company_name,
            record.current_price,
            record.change_rate.round_dp(2)
        );
    }
}

/// 기업 상세 조회.
pub async fn company(ctx: &ClientContext, name: String, format: OutputFormat) -> Result<()> {
    ctx.require_login()?;

    let view = CompanyView::new(name, ctx.api.clone());
    view.load().await?;
    let state = view.state().await;

    let Some(detail) = state.detail else {
        println!("기업 정보를 찾을 수 없습니다: {}", view.company_name());
        return Ok(());
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("{} ({})", detail.company_name, detail.ticker());
    println!("  현재가: {}", detail.current_price);
    if let Some((change, rate)) = detail.change_since_open() {
        println!("  시작가 대비: {} ({}%)", change, rate.round_dp(2));
    }
    println!(
        "  리스크: {} (점수 {}, 변동성 {})",
        detail.risk_metrics.level, detail.risk_metrics.score, detail.risk_metrics.volatility
    );
    println!("  보유 수량: {}주", state.shares);
    println!("  보유 현금: {}", state.cash);
    Ok(())
}

/// 포트폴리오 조회.
pub async fn portfolio(ctx: &ClientContext, format: OutputFormat) -> Result<()> {
    ctx.require_login()?;

    let Some(portfolio) = ctx.api.portfolio().await? else {
        println!("포트폴리오가 비어 있습니다.");
        return Ok(());
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&portfolio)?);
        return Ok(());
    }

    println!("{:<20} {:>8} {:>12} {:>12} {:>12}", "기업", "수량", "평균가", "현재가", "손익");
    for position in &portfolio.positions {
        println!(
            "{:<20} {:>8} {:>12} {:>12} {:>12}",
            position.display_name(),
            position.quantity,
            position.average_price,
            position.current_price,
            position.profit()
        );
    }
    println!();
    println!("현금: {}", portfolio.cash());
    println!("주식 평가액: {}", portfolio.stock_value());
    println!("총 자산: {}", portfolio.total_assets());
    Ok(())
}

/// 자산 랭킹 조회.
pub async fn ranking(ctx: &ClientContext, format: OutputFormat) -> Result<()> {
    ctx.require_login()?;

    let rankings = ctx.api.rankings().await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rankings)?);
        return Ok(());
    }

    for (rank, entry) in rankings.iter().enumerate() {
        println!("{:>3}. {:<20} {:>15}", rank + 1, entry.username, entry.total_assets);
    }
    Ok(())
}

/// 섹터 테마 조회.
pub async fn themes(ctx: &ClientContext, format: OutputFormat) -> Result<()> {
    ctx.require_login()?;

    let themes = ctx.api.sector_themes().await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&themes)?);
        return Ok(());
    }

    for theme in &themes {
        let sign = if theme.change_rate >= Decimal::ZERO { "+" } else { "" };
        println!(
            "{:<20} {}{}%  주도주: {}",
            theme.display_name(),
            sign,
            theme.change_rate.round_dp(2),
            theme.leading_stock.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
