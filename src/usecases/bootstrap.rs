use std::path::Path;

use crate::{
    infra::{self, config, error::AppError, session_store::SessionStore, storage_layout::StorageLayout},
    usecases::context::AppContext,
};

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let context = build_context(config_path)?;
    context.layout.ensure_dirs()?;
    infra::logging::init(&context.config.logging)?;

    Ok(context)
}

fn build_context(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let config = config::load(config_path)?;
    let layout = StorageLayout::resolve()?;
    let tokens = SessionStore::new(layout.auth_file());

    Ok(AppContext::new(config, layout, tokens))
}
