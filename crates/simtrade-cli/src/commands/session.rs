//! 로그인/로그아웃 명령.

use anyhow::Result;
use tracing::info;

use super::context::ClientContext;

/// OAuth 로그인 URL 출력.
pub fn login(ctx: &ClientContext) -> Result<()> {
    let url = ctx.login_flow().login_url()?;
    println!("브라우저에서 다음 주소로 로그인하세요:");
    println!("  {}", url);
    println!();
    println!("로그인 후 이동한 콜백 URL을 `simtrade callback <URL>`로 전달하세요.");
    Ok(())
}

/// 로그인 콜백 처리.
pub async fn callback(ctx: &ClientContext, callback: Option<String>) -> Result<()> {
    let flow = ctx.login_flow();
    let callback = callback.unwrap_or_default();

    flow.complete_callback(&callback).await?;
    info!("로그인 완료");
    println!("로그인 완료. 토큰 저장 위치: {}", ctx.config.storage.token_path.display());
    Ok(())
}

/// 로그아웃.
pub fn logout(ctx: &ClientContext) -> Result<()> {
    ctx.login_flow().logout()?;
    println!("로그아웃되었습니다.");
    Ok(())
}
