use std::fmt::Write;

use {
    anyhow::Result,
    ferry_config::FerryConfig,
    ferry_relay::{FileRouteStore, RouteMap, RouteStore},
};

/// `ferry routes`: print the persisted route table.
pub async fn print_routes(config: &FerryConfig, json: bool) -> Result<()> {
    let path = config.storage.resolved_routes_path();
    let routes = FileRouteStore::new(path.clone()).load().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&routes)?);
    } else {
        eprintln!("Routes in {}\n", path.display());
        print!("{}", summarize(&routes));
    }
    Ok(())
}

fn summarize(routes: &RouteMap) -> String {
    if routes.values().all(|owned| owned.is_empty()) {
        return "No routes.\n".to_string();
    }
    let mut out = String::new();
    for (owner_id, owned) in routes {
        let _ = writeln!(out, "owner {owner_id}");
        for (name, route) in owned {
            let f = &route.filters;
            let _ = writeln!(
                out,
                "  {name}: {} -> {} [{}]",
                route.source,
                route.destination,
                if route.active { "active" } else { "paused" }
            );
            let mut flags = Vec::new();
            if f.remove_mentions {
                flags.push("remove-mentions".to_string());
            }
            if f.block_urls {
                flags.push("block-urls".to_string());
            }
            for (label, count) in [
                ("blacklist", f.blacklist_words.len()),
                ("url-blacklist", f.blacklisted_url_substrings.len()),
                ("blocked-sentences", f.blocked_sentences.len()),
                ("blocked-images", f.blocked_image_fingerprints.len()),
            ] {
                if count > 0 {
                    flags.push(format!("{label}={count}"));
                }
            }
            if !flags.is_empty() {
                let _ = writeln!(out, "    {}", flags.join(" "));
            }
        }
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, ferry_relay::Route, std::collections::BTreeMap};

    #[test]
    fn summary_lists_routes_and_flags() {
        let mut route = Route::new(-100, -200);
        route.filters.remove_mentions = true;
        route.filters.blacklist_words = ["spam".to_string()].into();
        let mut paused = Route::new(-300, -400);
        paused.active = false;

        let mut owned = BTreeMap::new();
        owned.insert("news".to_string(), route);
        owned.insert("sports".to_string(), paused);
        let mut routes = RouteMap::new();
        routes.insert(7, owned);

        assert_eq!(
            summarize(&routes),
            "owner 7\n  news: -100 -> -200 [active]\n    remove-mentions blacklist=1\n  sports: -300 -> -400 [paused]\n"
        );
    }

    #[test]
    fn empty_table() {
        assert_eq!(summarize(&RouteMap::new()), "No routes.\n");
    }

    #[tokio::test]
    async fn missing_file_prints_nothing_routed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FerryConfig::default();
        config.storage.routes_path = Some(dir.path().join("routes.json"));
        print_routes(&config, true).await.unwrap();
    }
}
