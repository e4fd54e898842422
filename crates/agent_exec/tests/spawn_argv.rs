use agent_exec::{build_spawn_spec, AgentKind, ExecutorConfig, McpServerConfig};

#[test]
fn claude_argv_orders_stream_flags_first() {
    let config = ExecutorConfig::new()
        .work_dir("/tmp")
        .model("sonnet")
        .auto_approve(true)
        .resume_session("sess-9");
    let spec = build_spawn_spec(AgentKind::Claude, &config, "hello").unwrap();

    assert_eq!(spec.executable.to_str(), Some("claude"));
    assert!(spec.argv.starts_with(&[
        "--print".to_string(),
        "--verbose".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--input-format".to_string(),
        "stream-json".to_string(),
        "--model".to_string(),
        "sonnet".to_string(),
        "--dangerously-skip-permissions".to_string(),
    ]));
    assert!(spec
        .argv
        .windows(2)
        .any(|pair| pair == ["--resume", "sess-9"]));
    // Prompt goes over stdin, never into argv.
    assert!(!spec.argv.iter().any(|arg| arg.contains("hello")));
}

#[test]
fn claude_mcp_servers_become_one_json_flag() {
    let config = ExecutorConfig::new().work_dir("/tmp").mcp_server(
        "files",
        McpServerConfig::new("mcp-files").args(["--root", "/srv"]),
    );
    let spec = build_spawn_spec(AgentKind::Claude, &config, "x").unwrap();

    let idx = spec
        .argv
        .iter()
        .position(|arg| arg == "--mcp-config")
        .expect("--mcp-config flag");
    let parsed: serde_json::Value = serde_json::from_str(&spec.argv[idx + 1]).unwrap();
    assert_eq!(parsed["mcpServers"]["files"]["command"], "mcp-files");
    assert_eq!(parsed["mcpServers"]["files"]["args"][1], "/srv");
}

#[test]
fn cursor_appends_the_effective_prompt_positionally() {
    let config = ExecutorConfig::new()
        .work_dir("/tmp")
        .auto_approve(true)
        .append_prompt("keep diffs small");
    let spec = build_spawn_spec(AgentKind::Cursor, &config, "fix the bug").unwrap();

    assert_eq!(spec.executable.to_str(), Some("cursor-agent"));
    assert!(spec.argv.starts_with(&[
        "agent".to_string(),
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--force".to_string(),
    ]));
    assert_eq!(spec.argv.last().unwrap(), "fix the bug\n\nkeep diffs small");
}

#[test]
fn codex_resume_and_config_overrides() {
    let config = ExecutorConfig::new()
        .work_dir("/tmp")
        .resume_session("t-77")
        .mcp_server("files", McpServerConfig::new("mcp-files"));
    let spec = build_spawn_spec(AgentKind::Codex, &config, "x").unwrap();

    assert!(spec.argv.starts_with(&[
        "exec".to_string(),
        "--json".to_string(),
        "--skip-git-repo-check".to_string(),
    ]));
    assert!(spec
        .argv
        .windows(2)
        .any(|pair| pair == ["-c", "mcp_servers.files.command=mcp-files"]));
    assert!(spec.argv.windows(2).any(|pair| pair == ["resume", "t-77"]));
}

#[test]
fn copilot_translates_the_flags_it_knows() {
    let config = ExecutorConfig::new()
        .work_dir("/tmp")
        .model("gpt-5")
        .auto_approve(true)
        .resume_session("cp-1");
    let spec = build_spawn_spec(AgentKind::Copilot, &config, "do it").unwrap();

    assert!(spec.argv.starts_with(&[
        "--log-format".to_string(),
        "json".to_string(),
        "--model".to_string(),
        "gpt-5".to_string(),
        "--allow-all-tools".to_string(),
    ]));
    assert_eq!(spec.argv.last().unwrap(), "do it");
}

#[test]
fn options_a_vendor_has_no_flag_for_are_ignored() {
    // Cursor has no MCP flag form; the map is simply not translated.
    let config = ExecutorConfig::new()
        .work_dir("/tmp")
        .mcp_server("files", McpServerConfig::new("mcp-files"));
    let spec = build_spawn_spec(AgentKind::Cursor, &config, "x").unwrap();
    assert!(!spec.argv.iter().any(|arg| arg.contains("mcp")));
}

#[test]
fn mcp_server_env_extends_the_child_environment() {
    let config = ExecutorConfig::new()
        .work_dir("/tmp")
        .env("SUPERVISOR_FLAG", "1")
        .mcp_server(
            "files",
            McpServerConfig::new("mcp-files").env("FILES_TOKEN", "abc"),
        );
    let spec = build_spawn_spec(AgentKind::Claude, &config, "x").unwrap();

    assert_eq!(spec.env.get("SUPERVISOR_FLAG").map(String::as_str), Some("1"));
    assert_eq!(spec.env.get("FILES_TOKEN").map(String::as_str), Some("abc"));
}

#[test]
fn executable_override_wins_over_the_default() {
    let config = ExecutorConfig::new()
        .work_dir("/tmp")
        .executable("/opt/bin/claude-pinned");
    let spec = build_spawn_spec(AgentKind::Claude, &config, "x").unwrap();
    assert_eq!(spec.executable.to_str(), Some("/opt/bin/claude-pinned"));
}
