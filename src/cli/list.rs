use table::{IntoTable, Table};

pub(crate) mod table;

use crate::catalog::{CatalogStore, ModelRecord};
use crate::config::Config;
use crate::fatal;
use crate::providers::{Provider, ProviderRegistry};
use crate::{ListArgs, ListObject, ListingFormat};

#[derive(serde::Serialize)]
struct ModelRow {
    model_id: String,
    provider: String,
    capabilities: String,
    cost: String,
    free: bool,
    last_verified: String,
}

impl From<&ModelRecord> for ModelRow {
    fn from(record: &ModelRecord) -> Self {
        let capabilities: Vec<String> = record
            .capabilities
            .iter()
            .map(|c| c.to_string())
            .collect();

        ModelRow {
            model_id: record.id.clone(),
            provider: record.provider.clone(),
            capabilities: capabilities.join(","),
            cost: record.cost_level.to_string(),
            free: record.is_free,
            last_verified: record.last_verified.format("%Y-%m-%d").to_string(),
        }
    }
}

impl From<Vec<ModelRow>> for Table {
    fn from(value: Vec<ModelRow>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["MODEL", "PROVIDER", "CAPABILITIES", "COST", "VERIFIED"]);

        for row in value {
            tab.add_row(vec![
                row.model_id,
                row.provider,
                row.capabilities,
                row.cost,
                row.last_verified,
            ]);
        }

        tab
    }
}

#[derive(serde::Serialize)]
struct ProviderRow {
    provider: String,
    base_url: String,
    priority: u8,
    critical: bool,
    enabled: bool,
}

impl From<&Provider> for ProviderRow {
    fn from(provider: &Provider) -> Self {
        ProviderRow {
            provider: provider.name.clone(),
            base_url: provider.base_url.clone(),
            priority: provider.priority,
            critical: provider.critical,
            enabled: provider.enabled,
        }
    }
}

impl From<Vec<ProviderRow>> for Table {
    fn from(value: Vec<ProviderRow>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["PROVIDER", "URL", "PRIORITY", "CRITICAL", "ENABLED"]);

        for row in value {
            tab.add_row(vec![
                row.provider,
                row.base_url,
                row.priority.to_string(),
                if row.critical { "critical" } else { "-" }.to_string(),
                if row.enabled { "enabled" } else { "disabled" }.to_string(),
            ]);
        }

        tab
    }
}

pub(crate) fn format_output<O: IntoTable + serde::Serialize>(object: O, format: ListingFormat) {
    match format {
        ListingFormat::Json => {
            let output =
                serde_json::to_string_pretty(&object).expect("failed to serialize object");

            println!("{}", output);
        }
        ListingFormat::Table => {
            let tab = object.into_table();

            print!("{}", tab);
        }
        ListingFormat::HeaderlessTable => {
            let mut tab = object.into_table();

            tab.print_header(false);

            print!("{}", tab);
        }
    }
}

pub(crate) fn list_cmd(config: &Config, args: &ListArgs) {
    let format = args.format;

    match &args.object {
        ListObject::Models(model_args) => {
            let catalog = super::load_catalog(config);

            if catalog.len() == 0 {
                fatal!("the catalog is empty, run \"modelwatch sync\" first");
            }

            let rows: Vec<ModelRow> = catalog
                .all_models()
                .into_iter()
                .filter(|record| match &model_args.provider {
                    Some(provider) => &record.provider == provider,
                    None => true,
                })
                .filter(|record| !model_args.free || record.is_free)
                .map(ModelRow::from)
                .collect();

            format_output(rows, format);
        }
        ListObject::Providers => {
            let registry = match ProviderRegistry::from_config(config) {
                Ok(registry) => registry,
                Err(err) => fatal!("invalid provider configuration: {}", err),
            };

            let rows: Vec<ProviderRow> = registry.all().iter().map(ProviderRow::from).collect();

            format_output(rows, format);
        }
    }
}
