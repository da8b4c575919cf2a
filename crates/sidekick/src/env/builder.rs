//
// env/builder.rs
//
// Assembly of the virtual environment for one worker
//

use std::collections::BTreeMap;

use super::{Environment, EnvironmentDescriptor, Services, VirtualFileSet};
use crate::config::BaselineDeclaration;
use crate::perf::{self, Phase, PhaseTimer};

/// Baseline lib files that only matter to browser, worker or scripting hosts
const STRIPPED_LIB_MARKERS: &[&str] = &["lib.dom", "lib.webworker", "lib.scripthost"];

/// Whether a baseline lib file is irrelevant to the sandbox
pub fn is_stripped_lib(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.ends_with(".full.d.ts") || STRIPPED_LIB_MARKERS.iter().any(|m| name.starts_with(m))
}

/// Remove host-specific libs, returning the kept files and the number removed
pub fn strip_baseline(libs: BTreeMap<String, String>) -> (BTreeMap<String, String>, usize) {
    let total = libs.len();
    let kept: BTreeMap<String, String> = libs
        .into_iter()
        .filter(|(path, _)| !is_stripped_lib(path))
        .collect();
    let removed = total - kept.len();
    (kept, removed)
}

/// Build the environment for one document.
///
/// Never fails: declarations that cannot be fetched are logged and left out,
/// which only costs completions.
pub async fn build_environment(
    services: &Services,
    descriptor: &EnvironmentDescriptor,
    baseline: &[BaselineDeclaration],
    document_path: &str,
    initial_content: &str,
) -> Environment {
    let timer = PhaseTimer::start(Phase::EnvironmentBuild);

    let (mut declarations, stripped) = strip_baseline(services.engine.lib_files(descriptor.target));
    log::trace!("Stripped {} host-specific lib files", stripped);

    declarations.insert(
        descriptor.globals_path.clone(),
        descriptor.globals_source.clone(),
    );

    for declaration in baseline {
        if let Some(content) = load_baseline(services, declaration).await {
            declarations.insert(declaration.virtual_path.clone(), content);
        }
    }

    let files = VirtualFileSet::new(document_path, initial_content, declarations);
    let file_count = files.len();
    let env = Environment::new(files, services.engine.as_ref(), descriptor.clone());

    timer.stop();
    perf::record_session_shape(file_count, stripped);
    log::info!(
        "Built environment for {} ({} files, target {:?})",
        document_path,
        file_count,
        descriptor.target
    );
    env
}

async fn load_baseline(services: &Services, declaration: &BaselineDeclaration) -> Option<String> {
    if let Some(content) = services.cache.get_item(&declaration.virtual_path).await {
        perf::increment_declarations_from_cache(1);
        return Some(content);
    }

    match services.fetcher.fetch(&declaration.url_path).await {
        Ok(content) => {
            perf::increment_declarations_fetched();
            if let Err(e) = services
                .cache
                .set_item(&declaration.virtual_path, &content)
                .await
            {
                log::warn!("Failed to cache {}: {}", declaration.virtual_path, e);
            }
            Some(content)
        }
        Err(e) => {
            perf::increment_fetch_failures();
            log::warn!(
                "Failed to fetch {} ({}); continuing without it",
                declaration.url_path,
                e
            );
            None
        }
    }
}
