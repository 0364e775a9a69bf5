// ==========================================
// 分组选题分配系统 - 命令行入口
// ==========================================
// 用法:
//   group-allocation queue [domain_id] [faculty_id]
//   group-allocation overview
//   group-allocation faculty
//   group-allocation select <group_id> <faculty_id> <domain_id> <topic_id>
//   group-allocation release <group_id>
//   group-allocation config
//   group-allocation check
// 数据库路径: GROUP_ALLOCATION_DB_PATH 或用户数据目录
// ==========================================

use group_allocation::app::{get_default_db_path, AppState};
use group_allocation::domain::SelectionPayload;
use serde::Serialize;
use std::error::Error;

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn non_empty(arg: Option<&String>) -> Option<&str> {
    arg.map(|s| s.trim()).filter(|s| !s.is_empty() && *s != "-")
}

fn usage() {
    eprintln!("{} v{}", group_allocation::APP_NAME, group_allocation::VERSION);
    eprintln!("用法:");
    eprintln!("  group-allocation queue [domain_id|-] [faculty_id]");
    eprintln!("  group-allocation overview");
    eprintln!("  group-allocation faculty");
    eprintln!("  group-allocation select <group_id> <faculty_id> <domain_id> <topic_id>");
    eprintln!("  group-allocation release <group_id>");
    eprintln!("  group-allocation config");
    eprintln!("  group-allocation check");
}

fn main() -> Result<(), Box<dyn Error>> {
    group_allocation::logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        usage();
        return Ok(());
    };

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);
    let state = AppState::new(db_path)?;
    let api = &state.allocation_api;

    match command {
        "queue" => print_json(&api.get_queue(non_empty(args.get(1)), non_empty(args.get(2)))?)?,
        "overview" => print_json(&api.faculty_overview()?)?,
        "faculty" => print_json(&api.list_available_faculty()?)?,
        "select" => {
            let payload = SelectionPayload {
                group_id: args.get(1).cloned(),
                faculty_id: args.get(2).cloned(),
                domain_id: args.get(3).cloned(),
                topic_id: args.get(4).cloned(),
            };
            match api.select(payload) {
                Ok(receipt) => print_json(&receipt)?,
                Err(e) => {
                    eprintln!("[{}] {}", e.error_code(), e);
                    std::process::exit(if e.is_retryable() { 75 } else { 1 });
                }
            }
        }
        "release" => {
            let group_id = non_empty(args.get(1)).ok_or("缺少 group_id")?;
            print_json(&api.release(group_id)?)?
        }
        "config" => println!("{}", state.config_manager.get_config_snapshot()?),
        "check" => {
            let drift = api.ledger_drift()?;
            print_json(&drift)?;
            if !drift.is_empty() {
                std::process::exit(1);
            }
        }
        _ => {
            usage();
            std::process::exit(2);
        }
    }

    Ok(())
}
