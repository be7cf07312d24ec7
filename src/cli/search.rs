use std::io::Write;
use std::str::FromStr;

use crate::catalog::{Capability, CatalogStore, ModelRecord};
use crate::cli::list::{format_output, table::Table};
use crate::config::Config;
use crate::{fatal, SearchArgs, SortField};

const POPULAR_MIN_DOWNLOADS: u64 = 10000;

#[derive(serde::Serialize)]
struct SearchRow {
    model_id: String,
    provider: String,
    capabilities: String,
    free: bool,
    downloads: Option<u64>,
    likes: Option<u64>,
}

impl From<&ModelRecord> for SearchRow {
    fn from(record: &ModelRecord) -> Self {
        let capabilities: Vec<String> = record
            .capabilities
            .iter()
            .map(|c| c.to_string())
            .collect();

        SearchRow {
            model_id: record.id.clone(),
            provider: record.provider.clone(),
            capabilities: capabilities.join(","),
            free: record.is_free,
            downloads: record.downloads,
            likes: record.likes,
        }
    }
}

impl From<Vec<SearchRow>> for Table {
    fn from(value: Vec<SearchRow>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["MODEL", "PROVIDER", "CAPABILITIES", "FREE", "DOWNLOADS"]);

        for row in value {
            tab.add_row(vec![
                row.model_id,
                row.provider,
                row.capabilities,
                if row.free { "free" } else { "-" }.to_string(),
                row.downloads
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }

        tab.align_right(4);

        tab
    }
}

pub(crate) fn search_cmd(config: &Config, args: &SearchArgs) {
    let catalog = super::load_catalog(config);

    if catalog.len() == 0 {
        fatal!("the catalog is empty, run \"modelwatch sync\" first");
    }

    let capability = args.capability.as_deref().map(|raw| {
        match Capability::from_str(raw) {
            Ok(capability) => capability,
            Err(_) => fatal!("unknown capability \"{}\"", raw),
        }
    });

    let min_downloads = if args.popular {
        args.min_downloads.max(POPULAR_MIN_DOWNLOADS)
    } else {
        args.min_downloads
    };

    let query = args.query.as_deref().map(str::to_ascii_lowercase);

    let mut matches: Vec<&ModelRecord> = catalog
        .all_models()
        .into_iter()
        .filter(|record| match &query {
            Some(query) => record.id.to_ascii_lowercase().contains(query),
            None => true,
        })
        .filter(|record| match capability {
            Some(capability) => record.capabilities.contains(&capability),
            None => true,
        })
        .filter(|record| match &args.provider {
            Some(provider) => &record.provider == provider,
            None => true,
        })
        .filter(|record| !args.free || record.is_free)
        .filter(|record| min_downloads == 0 || record.downloads.unwrap_or(0) >= min_downloads)
        .collect();

    sort_matches(&mut matches, args.sort, args.asc);
    matches.truncate(args.limit);

    if matches.is_empty() {
        println!("no models matched");

        return;
    }

    if let Some(path) = &args.csv {
        if let Err(err) = export_csv(&matches, path) {
            fatal!("failed to export csv {}: {}", path.display(), err);
        }

        println!("exported {} models to {}", matches.len(), path.display());

        return;
    }

    let rows: Vec<SearchRow> = matches.into_iter().map(SearchRow::from).collect();

    format_output(rows, args.format);
}

fn sort_matches(matches: &mut [&ModelRecord], sort: SortField, ascending: bool) {
    match sort {
        SortField::Downloads => {
            matches.sort_by_key(|record| record.downloads.unwrap_or(0));
        }
        SortField::Likes => {
            matches.sort_by_key(|record| record.likes.unwrap_or(0));
        }
        SortField::Id => {
            matches.sort_by(|a, b| a.id.cmp(&b.id));
        }
    }

    // popularity sorts read best as leaderboards, so they default to
    // descending; id sorts stay ascending
    let want_ascending = ascending || matches!(sort, SortField::Id);

    if !want_ascending {
        matches.reverse();
    }
}

fn export_csv(matches: &[&ModelRecord], path: &std::path::Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = std::fs::File::create(path)?;

    writeln!(file, "model_name,capability,provider")?;

    for record in matches {
        let capabilities: Vec<String> = record
            .capabilities
            .iter()
            .map(|c| c.to_string())
            .collect();

        writeln!(
            file,
            "{},{},{}",
            csv_field(&record.id),
            csv_field(&capabilities.join(";")),
            csv_field(&record.provider)
        )?;
    }

    Ok(())
}

/// Quotes a field when it would break the row.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
