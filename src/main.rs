use std::net::SocketAddr;
use voice_agent::{config::Config, handlers::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Starting AI Voice Agent...");

    let config = Config::load_or_create_default("config.toml")?;

    println!("Configuration loaded");
    println!("Server address: {}", config.server_address());
    println!(
        "Services configured: STT={} LLM={} TTS={}",
        config.stt.api_key.is_some(),
        config.llm.api_key.is_some(),
        config.tts.api_key.is_some()
    );
    if config.stt.api_key.is_none() || config.llm.api_key.is_none() || config.tts.api_key.is_none()
    {
        eprintln!("Warning: some services are not configured; fallback responses will be used");
    }

    let app_state = AppState::new(config.clone());
    let app = voice_agent::create_app(app_state);

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server address: {}", e))?;

    println!("Listening on http://{}", addr);
    println!("Endpoints:");
    println!("  GET    /                                 - recorder UI");
    println!("  POST   /agent/chat/{{session_id}}          - voice chat turn");
    println!("  GET    /agent/chat/{{session_id}}/history  - session history");
    println!("  DELETE /agent/chat/{{session_id}}          - clear session");
    println!("  GET    /agent/stats                      - session statistics");
    println!("  POST   /llm/query                        - sessionless LLM query");
    println!("  POST   /stt/transcribe                   - transcribe audio");
    println!("  POST   /tts/generate                     - synthesize speech");
    println!("  GET    /health                           - service status");
    println!("  GET    /api/info                         - API information");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {}", e))?;

    Ok(())
}
