use crate::config::Config;
use anyhow::Result;
use cache_core::MetricCategory;
use cache_coordinator::{CacheCoordinator, CoordinatorStats};
use cache_monitor::HEAP_USED_METRIC;
use cache_store::{Bookmark, IndexedStore, MemoryPageSource, PageSource, PagedLoader};
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Coordinator with a bookmark store and a history loader attached
struct Demo {
    coordinator: CacheCoordinator,
    bookmarks: Arc<IndexedStore<Bookmark>>,
    history: Arc<PagedLoader<String>>,
}

fn build_demo(config: &Config) -> Result<Demo> {
    let settings = &config.coordinator;

    let bookmarks = Arc::new(IndexedStore::new("bookmarks", settings.store_query_cache_entries)?);
    bookmarks.load(demo_bookmarks())?;

    let items: Vec<String> = (0..config.demo_items)
        .map(|i| format!("visit #{}", i))
        .collect();
    let source: Arc<dyn PageSource<String>> = Arc::new(MemoryPageSource::new(items));
    let history = Arc::new(PagedLoader::new(
        "history",
        source,
        settings.page_size,
        settings.cached_pages,
    )?);

    let coordinator = CacheCoordinator::new(settings.clone())?
        .with_domain_cache("bookmarks", bookmarks.clone())
        .with_domain_cache("history", history.clone());

    Ok(Demo {
        coordinator,
        bookmarks,
        history,
    })
}

fn demo_bookmarks() -> Vec<Bookmark> {
    vec![
        Bookmark::new("rust-book", "The Rust Programming Language", "https://doc.rust-lang.org/book")
            .with_tags(["rust", "docs"]),
        Bookmark::new("tokio", "Tokio Tutorial", "https://tokio.rs/tokio/tutorial")
            .with_tags(["rust", "async"]),
        Bookmark::new("serde", "Serde Guide", "https://serde.rs").with_tags(["rust", "serialization"]),
        Bookmark::new("lru", "LRU cache replacement", "https://en.wikipedia.org/wiki/Cache_replacement_policies")
            .with_tags(["caching"]),
        Bookmark::new("procfs", "proc(5) manual", "https://man7.org/linux/man-pages/man5/proc.5.html")
            .with_tags(["linux", "memory"]),
    ]
}

/// Run one pass of traffic through every cache
async fn exercise(demo: &Demo, config: &Config) -> Result<()> {
    let coordinator = &demo.coordinator;

    for query in ["rust", "Tokio", "rust", "memory"] {
        let results = demo.bookmarks.search(query);
        let ids: Vec<&str> = results.iter().map(|b| b.id.as_str()).collect();
        coordinator.cache_search_results(query, json!(ids))?;
    }
    demo.bookmarks.filter_by_tag("rust");
    demo.bookmarks.filter_by_tag("rust");

    let page_size = demo.history.page_size();
    let recent = demo.history.range(page_size / 2, page_size * 2).await;
    info!("Read {} history items", recent.len());
    demo.history.preload(2, config.preload_radius)?.await?;

    coordinator.cache_recommendations(
        "user-1",
        json!(["tokio", "serde"]),
        Duration::from_secs(600),
    )?;
    coordinator.get_cached_recommendations("user-1");
    coordinator.get_cached_recommendations("user-2");
    coordinator.get_cached_search_results("RUST");

    if let Err(e) = coordinator.monitor().sample_memory() {
        warn!("No memory reading available: {}", e);
    }
    Ok(())
}

pub async fn show_report(config: &Config) -> Result<()> {
    let start = Instant::now();
    println!("{} Building demo caches...", "→".bright_blue());

    let demo = build_demo(config)?;
    demo.coordinator.initialize()?;

    let exercise_start = Instant::now();
    exercise(&demo, config).await?;
    demo.coordinator.monitor().record(
        "demo.exercise",
        exercise_start.elapsed().as_secs_f64() * 1000.0,
        MetricCategory::Timing,
    );

    print_cache_table(&demo.coordinator.stats());
    println!();
    println!("{}", demo.coordinator.report());

    demo.coordinator.shutdown().await;
    println!(
        "{} {:.2}ms",
        "Total time:".bright_yellow(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

pub async fn run_monitor(config: &Config, seconds: u64) -> Result<()> {
    let demo = build_demo(config)?;
    demo.coordinator.initialize()?;
    exercise(&demo, config).await?;

    println!(
        "{} Monitoring for {}s (sample every {:?}, check every {:?})",
        "→".bright_blue(),
        seconds,
        config.coordinator.monitor.sample_interval(),
        config.coordinator.reclaimer.check_interval()
    );
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let samples = demo.coordinator.monitor().history_len(HEAP_USED_METRIC);
    println!("{} Collected {} memory samples", "✓".bright_green(), samples);

    print_cache_table(&demo.coordinator.stats());
    println!();
    println!("{}", demo.coordinator.report());

    demo.coordinator.shutdown().await;
    Ok(())
}

pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.to_json()?);
    Ok(())
}

fn print_cache_table(stats: &CoordinatorStats) {
    println!();
    println!("{}", "Cache Statistics".bright_yellow().bold());
    println!();

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Cache").fg(Color::Cyan),
        Cell::new("Entries").fg(Color::Green),
        Cell::new("Capacity").fg(Color::Green),
        Cell::new("Hits").fg(Color::Yellow),
        Cell::new("Misses").fg(Color::Yellow),
        Cell::new("Evictions").fg(Color::Magenta),
        Cell::new("Hit Rate").fg(Color::Magenta),
    ]);

    for cache in &stats.caches {
        table.add_row(vec![
            cache.name.clone(),
            cache.size.to_string(),
            cache.capacity.to_string(),
            cache.hits.to_string(),
            cache.misses.to_string(),
            cache.evictions.to_string(),
            format!("{:.1}%", cache.hit_rate * 100.0),
        ]);
    }

    println!("{}", table);

    match &stats.memory {
        Some(memory) => println!("{} {}", "Memory:".bright_yellow(), memory),
        None => println!("{}", "Memory: no reading available".bright_black()),
    }
}
