use anyhow::Context as _;
use forgeflow_client::WsClient;
use forgeflow_config::{Context, Credentials};
use forgeflow_provision::Host;

/// 設定名を決定する（共通ロジック）
///
/// `--name` 指定があればそれを検証し、なければ `latest` マーカーから
/// 最後に使用した設定名を引き継ぐ。
pub fn resolve_name(ctx: &Context, name: Option<String>) -> anyhow::Result<String> {
    if let Some(name) = name {
        if !ctx.hosts_dir().join(&name).is_dir() {
            anyhow::bail!("設定 \"{name}\" が見つかりません");
        }
        return Ok(name);
    }

    ctx.read_latest().ok_or_else(|| {
        anyhow::anyhow!(
            "先に \"forge init\" で新しい設定を作成するか、--name で既存の設定を指定してください"
        )
    })
}

/// 既存のホスト設定を開き、latest マーカーを更新する
pub fn open_host(ctx: &Context, name: Option<String>) -> anyhow::Result<Host> {
    let name = resolve_name(ctx, name)?;
    let host = Host::open(ctx, &name)?;
    ctx.write_latest(host.name())?;
    Ok(host)
}

/// 認証情報からウェブサービスクライアントを構築する
pub fn ws_client(ctx: &Context) -> anyhow::Result<WsClient> {
    let cred_path = ctx.find_credentials(&[])?;
    let credentials =
        Credentials::from_path(&cred_path).context("認証情報の読み込みに失敗しました")?;
    Ok(WsClient::new(ctx.clone(), credentials)?)
}
