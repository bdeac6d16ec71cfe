use anyhow::Result;

use refrain_embed::Config;
use refrain_search::{suggestions, SearchError, SearchOptions, SearchResponse, SearchService};

/// Lyrics shown per hit in the plain-text listing.
const SNIPPET_CHARS: usize = 120;

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f64>,
    json: bool,
) -> Result<()> {
    let provider = super::provider(config)?;
    let service = SearchService::new(
        config.database_path.clone(),
        provider,
        SearchOptions::from(config),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let response = match service.search_until(query, limit, threshold, shutdown).await {
        Ok(response) => response,
        Err(SearchError::Cancelled) => {
            eprintln!("Search cancelled");
            return Ok(());
        }
        Err(e @ SearchError::QueryEmbedding(_)) if e.is_retryable() => {
            anyhow::bail!("{e}\n\nThe search may succeed if you try again later.");
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        return super::print_json(&response);
    }
    print_response(&response);
    Ok(())
}

fn print_response(response: &SearchResponse) {
    println!(
        "\n🔎 {} results for \"{}\" ({:.2} ms)\n",
        response.total_results, response.query, response.processing_time_ms
    );

    if response.results.is_empty() {
        println!("  No songs matched. Try a lower --threshold or a different phrasing.");
        return;
    }

    for (rank, hit) in response.results.iter().enumerate() {
        let song = &hit.song;
        let year = song.year.map(|y| format!(" ({y})")).unwrap_or_default();
        println!(
            "  {:>2}. {} by {}{}  [{:.3}]",
            rank + 1,
            song.track_name,
            song.artist_name,
            year,
            hit.score
        );
        println!("      id {}: {}", song.id, snippet(&song.lyrics));
    }
}

fn snippet(lyrics: &str) -> String {
    let flat = lyrics.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub fn show_suggestions(json: bool) -> Result<()> {
    let catalogue = suggestions();
    if json {
        return super::print_json(&catalogue);
    }

    println!("\n💡 Example searches\n");
    for group in catalogue.suggestions {
        println!("  {}:", group.category);
        for query in group.queries {
            println!("    refrain search \"{query}\"");
        }
        println!();
    }
    println!("  Tips:");
    for tip in catalogue.tips {
        println!("    - {tip}");
    }
    Ok(())
}
