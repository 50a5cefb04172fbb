use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use odx_client::{ClientConfig, HttpBackend};
use odx_core::{
    CustomRange, DueDateBucket, FilterConfig, OpportunityKind, PostedDateBucket, SortKey,
};
use odx_store::{SearchResultStore, SearchStatus, StoreConfig};

#[derive(Debug, Parser)]
#[command(name = "odx-cli")]
#[command(about = "Opportunity discovery search pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one bounded search and print the derived page.
    Search {
        query: String,
        /// Due-date bucket: none|active|7d|30d|90d|365d
        #[arg(long, default_value = "none")]
        due_bucket: DueDateBucket,
        /// Posted-date bucket: all|1d|7d|30d|365d
        #[arg(long, default_value = "all")]
        posted_bucket: PostedDateBucket,
        /// Classification-code prefix (e.g. parent NAICS category)
        #[arg(long, default_value = "")]
        code: String,
        #[arg(long)]
        federal_only: bool,
        /// Sort key: relevance|due-date|posted-date|budget
        #[arg(long, default_value = "relevance")]
        sort: SortKey,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Also fetch scored recommendations for the result set.
        #[arg(long)]
        recommend: bool,
        /// Company website sent with the recommendation request.
        #[arg(long)]
        company_url: Option<String>,
        /// Company description sent with the recommendation request.
        #[arg(long)]
        company_description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Search {
            query,
            due_bucket,
            posted_bucket,
            code,
            federal_only,
            sort,
            page,
            recommend,
            company_url,
            company_description,
        } => {
            let backend = HttpBackend::new(ClientConfig::from_env())?;
            let mut config = StoreConfig::from_env();
            if let Some(url) = company_url {
                config.company_profile.url = url;
            }
            if let Some(description) = company_description {
                config.company_profile.description = description;
            }
            let mut store = SearchResultStore::new(config, Arc::new(backend));

            match store.run_search(&query).await {
                SearchStatus::Completed { count } => {
                    println!("search complete: {count} candidates");
                }
                SearchStatus::Ignored => bail!("query must not be empty"),
                SearchStatus::Failed { message } => bail!("search failed: {message}"),
                SearchStatus::Superseded => unreachable!("single search cannot be superseded"),
            }

            store.set_filter_config(FilterConfig {
                due_date_bucket: due_bucket,
                posted_date_bucket: posted_bucket,
                custom_range: CustomRange::default(),
                classification_code: code,
                opportunity_kind: if federal_only {
                    OpportunityKind::FederalOnly
                } else {
                    OpportunityKind::All
                },
            });
            store.set_sort_key(sort);

            let shown_page = store.paginate(page).to_vec();
            let session = store.session();
            if let Some(refined) = &session.refined_query {
                println!("showing results for: {refined}");
            }
            println!(
                "page {}/{} ({} of {} after filters)",
                session.page,
                store.total_pages(),
                shown_page.len(),
                session.working_list.len()
            );
            for opportunity in &shown_page {
                let due = opportunity
                    .due_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "no deadline".to_string());
                println!(
                    "- [{}] {} ({}, due {}, budget {})",
                    opportunity.id,
                    opportunity.title,
                    opportunity.agency,
                    due,
                    if opportunity.budget_text.is_empty() {
                        "n/a"
                    } else {
                        opportunity.budget_text.as_str()
                    }
                );
            }

            if recommend {
                let status = store.run_recommendations().await;
                println!("recommendations: {status:?}");
                let master_len = store.session().master_list.len();
                for (rec, linked) in store.linked_recommendations() {
                    let position = rec
                        .clamped_index(master_len)
                        .map(|i| format!("#{}", i + 1))
                        .unwrap_or_else(|| "#?".to_string());
                    let target = linked.map(|o| o.title.as_str()).unwrap_or("<unlinkable>");
                    println!("  {:>3}% {} {} -> {}", rec.match_score, position, rec.title, target);
                }
            }
        }
    }

    Ok(())
}
