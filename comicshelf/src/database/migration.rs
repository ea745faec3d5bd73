//! Migration definitions
//!
//! A migration is data: a target version plus an ordered list of tagged
//! steps. Scripts are plain SQL; hooks run against the catalog bound to the
//! same in-flight transaction, for backfills that SQL alone cannot express.

use super::catalog::ScopedCatalog;
use crate::error::Result;
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Code run inside a migration's transaction
#[async_trait]
pub trait MigrationHook: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    async fn run(&self, catalog: &mut ScopedCatalog<'_>) -> Result<()>;
}

/// One step of a migration
///
/// The runner executes steps by kind: every `PreHook`, then every `Script`,
/// then the version bump, then every `PostHook`. Within a kind, declaration
/// order is kept.
#[derive(Clone)]
pub enum MigrationStep {
    PreHook(Arc<dyn MigrationHook>),
    Script(Cow<'static, str>),
    PostHook(Arc<dyn MigrationHook>),
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::PreHook(hook) => write!(f, "PreHook({})", hook.name()),
            MigrationStep::Script(sql) => write!(f, "Script({} bytes)", sql.len()),
            MigrationStep::PostHook(hook) => write!(f, "PostHook({})", hook.name()),
        }
    }
}

/// A single schema version transition
#[derive(Clone, Debug)]
pub struct Migration {
    version: u32,
    steps: Vec<MigrationStep>,
}

impl Migration {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            steps: Vec::new(),
        }
    }

    /// A migration that only advances the version counter.
    pub fn stub(version: u32) -> Self {
        Self::new(version)
    }

    pub fn script(mut self, sql: impl Into<Cow<'static, str>>) -> Self {
        self.steps.push(MigrationStep::Script(sql.into()));
        self
    }

    pub fn pre_hook(mut self, hook: impl MigrationHook + 'static) -> Self {
        self.steps.push(MigrationStep::PreHook(Arc::new(hook)));
        self
    }

    pub fn post_hook(mut self, hook: impl MigrationHook + 'static) -> Self {
        self.steps.push(MigrationStep::PostHook(Arc::new(hook)));
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn is_stub(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn pre_hooks(&self) -> impl Iterator<Item = &Arc<dyn MigrationHook>> {
        self.steps.iter().filter_map(|step| match step {
            MigrationStep::PreHook(hook) => Some(hook),
            _ => None,
        })
    }

    pub(crate) fn scripts(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            MigrationStep::Script(sql) => Some(sql.as_ref()),
            _ => None,
        })
    }

    pub(crate) fn post_hooks(&self) -> impl Iterator<Item = &Arc<dyn MigrationHook>> {
        self.steps.iter().filter_map(|step| match step {
            MigrationStep::PostHook(hook) => Some(hook),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl MigrationHook for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, _catalog: &mut ScopedCatalog<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_steps_grouped_by_kind() {
        let migration = Migration::new(3)
            .post_hook(Named("after"))
            .script("CREATE TABLE a (x INTEGER)")
            .pre_hook(Named("before"))
            .script("CREATE TABLE b (y INTEGER)");

        assert_eq!(migration.version(), 3);
        assert!(!migration.is_stub());
        assert_eq!(
            migration.pre_hooks().map(|h| h.name()).collect::<Vec<_>>(),
            vec!["before"]
        );
        assert_eq!(
            migration.scripts().collect::<Vec<_>>(),
            vec!["CREATE TABLE a (x INTEGER)", "CREATE TABLE b (y INTEGER)"]
        );
        assert_eq!(
            migration.post_hooks().map(|h| h.name()).collect::<Vec<_>>(),
            vec!["after"]
        );
    }

    #[test]
    fn test_steps_keep_declaration_order() {
        let migration = Migration::new(1)
            .post_hook(Named("after"))
            .script("CREATE TABLE a (x INTEGER)")
            .pre_hook(Named("before"));

        let steps = migration.steps();
        assert_eq!(steps.len(), 3);
        assert!(matches!(&steps[0], MigrationStep::PostHook(h) if h.name() == "after"));
        assert!(matches!(&steps[1], MigrationStep::Script(sql) if sql == "CREATE TABLE a (x INTEGER)"));
        assert!(matches!(&steps[2], MigrationStep::PreHook(h) if h.name() == "before"));
    }

    #[test]
    fn test_stub_has_no_steps() {
        let stub = Migration::stub(2);
        assert!(stub.is_stub());
        assert!(stub.steps().is_empty());
        assert_eq!(format!("{:?}", stub), "Migration { version: 2, steps: [] }");
    }
}
