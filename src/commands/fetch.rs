use anyhow::Context;
use tracing::info;

use pyindex::link::{select_candidates, PackageLink};
use pyindex::pep440::{Version, VersionSpecifiers};
use pyindex::simple::{IndexClient, IndexConfig};

use crate::OutputFormat;

pub async fn fetch(
    project: String,
    index_url: String,
    prefer_json: bool,
    specifier: Option<String>,
    python: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let specifiers = specifier
        .as_deref()
        .map(str::parse::<VersionSpecifiers>)
        .transpose()
        .context("Invalid --specifier")?;
    let python = python
        .as_deref()
        .map(str::parse::<Version>)
        .transpose()
        .context("Invalid --python")?;

    let client = IndexClient::new(IndexConfig {
        index_url,
        prefer_json,
        ..IndexConfig::default()
    });

    info!("Fetching {} from {}", project, client.config().index_url);
    let page = client.fetch_project_page(&project).await?;
    let links = page.links(&project)?;
    info!("Found {} links on {}", links.len(), page.url);

    let selected: Vec<&PackageLink> = if specifiers.is_some() || python.is_some() {
        let specifiers = specifiers.unwrap_or_default();
        let candidates = select_candidates(&links, &specifiers, python.as_ref());
        info!("{} candidates match", candidates.len());
        candidates
    } else {
        links.iter().collect()
    };

    match format {
        OutputFormat::Text => {
            for link in selected {
                println!("{}", format_link(link));
            }
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&selected)?);
        },
    }

    Ok(())
}

fn format_link(link: &PackageLink) -> String {
    let mut line = format!(
        "{}\t{}\t{}",
        link.filename,
        link.version.as_deref().unwrap_or("-"),
        link.url
    );
    if let Some(hash) = &link.hash {
        line.push_str(&format!("\t{}", hash));
    }
    if let Some(requires_python) = &link.requires_python {
        line.push_str(&format!("\trequires-python:{}", requires_python));
    }
    if let Some(reason) = &link.yanked {
        if reason.is_empty() {
            line.push_str("\tyanked");
        } else {
            line.push_str(&format!("\tyanked:{}", reason));
        }
    }
    line
}
