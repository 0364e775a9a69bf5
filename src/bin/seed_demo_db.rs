// Dev utility: rebuild a demo database and run a concurrent selection burst against it.
//
// Usage:
//   cargo run --bin seed_demo_db -- [db_path] [group_count]
//
// Existing files at db_path (and its -wal/-shm) are removed first.

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use group_allocation::api::AllocationApi;
use group_allocation::app::AppState;
use group_allocation::domain::{Domain, NewFaculty, NewTopic, SelectionPayload, StudentGroup};

const DEFAULT_DB_PATH: &str = "group_allocation_demo.db";
const DEFAULT_GROUP_COUNT: usize = 40;

const DOMAINS: &[(&str, &str)] = &[
    ("D-ML", "Machine Learning"),
    ("D-SYS", "Distributed Systems"),
    ("D-SEC", "Security"),
];

const FACULTY: &[(&str, &str, i64)] = &[
    ("F-RAO", "Dr. Rao", 3),
    ("F-IYER", "Dr. Iyer", 3),
    ("F-SINGH", "Dr. Singh", 2),
    ("F-MEHTA", "Dr. Mehta", 4),
];

fn remove_db_files(db_path: &str) -> Result<(), Box<dyn Error>> {
    for suffix in ["", "-wal", "-shm"] {
        let path = format!("{}{}", db_path, suffix);
        if Path::new(&path).exists() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn seed_catalog(api: &AllocationApi, group_count: usize) -> Result<Vec<(String, String)>, Box<dyn Error>> {
    let mut topics = Vec::new();
    for (domain_id, name) in DOMAINS {
        api.register_domain(Domain {
            domain_id: domain_id.to_string(),
            name: name.to_string(),
            description: format!("{} projects", name),
        })?;
        for n in 1..=3 {
            let topic = api.register_topic(NewTopic {
                topic_id: format!("{}-T{}", domain_id, n),
                domain_id: domain_id.to_string(),
                name: format!("{} topic {}", name, n),
                description: String::new(),
                capacity_max: None,
            })?;
            topics.push((topic.domain_id, topic.topic_id));
        }
    }

    for (faculty_id, name, max) in FACULTY {
        api.register_faculty(NewFaculty {
            faculty_id: faculty_id.to_string(),
            name: name.to_string(),
            email: Some(format!("{}@example.edu", faculty_id.to_lowercase())),
            capacity_max: Some(*max),
        })?;
    }

    for n in 1..=group_count {
        api.register_group(StudentGroup {
            group_id: format!("G{:03}", n),
            leader_roll_number: Some(format!("R{:05}", 10_000 + n)),
            size: 3,
        })?;
    }

    Ok(topics)
}

fn main() -> Result<(), Box<dyn Error>> {
    group_allocation::logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let group_count = match args.next() {
        Some(raw) => raw.trim().parse::<usize>()?,
        None => DEFAULT_GROUP_COUNT,
    };

    remove_db_files(&db_path)?;
    let state = AppState::new(db_path.clone())?;
    let topics = seed_catalog(&state.allocation_api, group_count)?;
    println!("seeded: domains={} topics={} faculty={} groups={}", DOMAINS.len(), topics.len(), FACULTY.len(), group_count);

    // 所有小组同时抢占，按小组编号轮转选择导师和课题
    let topics = Arc::new(topics);
    let handles: Vec<_> = (1..=group_count)
        .map(|n| {
            let api = state.allocation_api.clone();
            let topics = topics.clone();
            thread::spawn(move || {
                let (domain_id, topic_id) = &topics[n % topics.len()];
                let (faculty_id, _, _) = FACULTY[n % FACULTY.len()];
                api.select(SelectionPayload {
                    group_id: Some(format!("G{:03}", n)),
                    faculty_id: Some(faculty_id.to_string()),
                    domain_id: Some(domain_id.clone()),
                    topic_id: Some(topic_id.clone()),
                })
            })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = std::collections::BTreeMap::<&'static str, usize>::new();
    for handle in handles {
        match handle.join() {
            Ok(Ok(_)) => accepted += 1,
            Ok(Err(e)) => *rejected.entry(e.error_code()).or_default() += 1,
            Err(_) => *rejected.entry("PANIC").or_default() += 1,
        }
    }
    println!("burst: accepted={} rejected={:?}", accepted, rejected);

    for row in state.allocation_api.faculty_overview()? {
        println!(
            "{:<8} {:<12} used={}/{} groups={:?}",
            row.faculty_id,
            row.name,
            row.capacity_used,
            row.capacity_max,
            row.assigned_groups.iter().map(|g| g.group_id.as_str()).collect::<Vec<_>>()
        );
    }
    println!("db_path={}", db_path);
    Ok(())
}
