//! 매수/매도 명령.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use simtrade_client::{CompanyView, ConnectionState, TradeNotification, TradeNotifier};
use simtrade_core::TradeSide;

use super::context::ClientContext;

/// 체결 결과를 터미널에 출력하는 알림 수신자.
pub struct ConsoleNotifier;

#[async_trait]
impl TradeNotifier for ConsoleNotifier {
    async fn notify(&self, notification: &TradeNotification) {
        println!("{}", notification.text());
    }
}

/// 주문 제출.
///
/// `wait_secs`가 0보다 크면 실시간 채널에서 체결 결과를 기다립니다.
pub async fn submit(
    ctx: &ClientContext,
    side: TradeSide,
    company: String,
    quantity: u32,
    wait_secs: u64,
) -> Result<()> {
    ctx.require_login()?;

    let view = Arc::new(CompanyView::new(company, ctx.api.clone()));
    view.load().await?;

    if wait_secs == 0 {
        let order = view.submit_trade(side, quantity).await?;
        println!(
            "{} 주문 접수: {} {}주 @ {} (총 {})",
            side.display_name(),
            order.company_name,
            order.quantity,
            order.price,
            order.total_cost()
        );
        return Ok(());
    }

    let wait = Duration::from_secs(wait_secs);
    let live = ctx.synchronizer();
    let _scope = live.enter_scope()?;

    let mut state = live.connection_state();
    if timeout(wait, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .is_err()
    {
        warn!("실시간 연결 대기 시간 초과, 체결 결과 없이 주문합니다");
    }

    let mut results = live.subscribe_trade_results()?;
    let order = view.submit_trade(side, quantity).await?;
    println!(
        "{} 주문 접수: {} {}주 @ {}",
        side.display_name(),
        order.company_name,
        order.quantity,
        order.price
    );

    match timeout(wait, results.recv()).await {
        Ok(Some(result)) => {
            view.handle_trade_result(&result, &ConsoleNotifier).await;
            let state = view.state().await;
            println!("보유 수량: {}주, 보유 현금: {}", state.shares, state.cash);
        }
        Ok(None) => warn!("실시간 연결이 종료되었습니다"),
        Err(_) => println!("{}초 안에 체결 결과를 받지 못했습니다.", wait_secs),
    }

    Ok(())
}
