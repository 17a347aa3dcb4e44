//! Runs every check over a directory of token descriptors.

use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    process::ExitCode,
};

use color_eyre::eyre::{self, Context as _};
use futures::{Stream, StreamExt as _, stream};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::{
    descriptor::{TokenDescriptor, dir_name},
    error::{DataDirNotFound, TokenIssue},
    fetch::TokenReader,
    reconcile::Reconciler,
    schema::SchemaValidator,
};

/// Verdict for one token directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReport {
    pub name: String,
    pub errors: Vec<String>,
}

impl TokenReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Verdicts for a whole run, in directory name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub data_dir: PathBuf,
    pub tokens: Vec<TokenReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.tokens.iter().all(TokenReport::is_valid)
    }

    pub fn invalid_count(&self) -> usize {
        self.tokens.iter().filter(|t| !t.is_valid()).count()
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    /// Opening lines, printed before the first token is checked.
    pub fn header(token_count: usize) -> String {
        format!("Validating {token_count} token(s)...\n\n")
    }

    /// Closing verdict, preceded by a blank line.
    pub fn summary(&self) -> String {
        if self.is_success() {
            format!("\nAll {} token(s) are valid\n", self.tokens.len())
        } else {
            "\nValidation failed for one or more tokens\n".to_string()
        }
    }
}

impl Display for TokenReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return writeln!(f, "{} is valid", self.name);
        }

        writeln!(f, "{} is invalid:", self.name)?;
        for error in &self.errors {
            writeln!(f, "   - {error}")?;
        }
        Ok(())
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tokens.is_empty() {
            return writeln!(
                f,
                "No token directories found in {}/",
                self.data_dir.display()
            );
        }

        f.write_str(&Self::header(self.tokens.len()))?;
        for token in &self.tokens {
            write!(f, "{token}")?;
        }
        f.write_str(&self.summary())
    }
}

/// Lists token directories under `data_dir`, sorted by name.
pub async fn token_dirs(data_dir: &Path) -> eyre::Result<Vec<PathBuf>> {
    if !fs::metadata(data_dir)
        .await
        .is_ok_and(|meta| meta.is_dir())
    {
        return Err(DataDirNotFound(data_dir.to_path_buf()).into());
    }

    let mut entries = fs::read_dir(data_dir)
        .await
        .wrap_err_with(|| format!("failed to list {}", data_dir.display()))?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .wrap_err("failed to read data directory entry")?
    {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort_by_key(|dir| dir.file_name().map(|name| name.to_os_string()));

    Ok(dirs)
}

/// Schema validation plus optional on-chain reconciliation.
#[derive(Debug, Clone)]
pub struct Validator<R> {
    schema: SchemaValidator,
    reconciler: Option<Reconciler<R>>,
    concurrency: usize,
}

impl<R: TokenReader> Validator<R> {
    /// Pass `None` as reconciler to skip on-chain checks.
    pub fn new(schema: SchemaValidator, reconciler: Option<Reconciler<R>>) -> Self {
        Self {
            schema,
            reconciler,
            concurrency: 1,
        }
    }

    /// Validate up to `concurrency` tokens at once. Report order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[instrument(skip(self), fields(onchain = self.reconciler.is_some()))]
    pub async fn run(&self, data_dir: &Path) -> eyre::Result<RunReport> {
        let dirs = token_dirs(data_dir).await?;
        info!(count = dirs.len(), "validating tokens");

        let tokens = self.reports(dirs).collect::<Vec<_>>().await;

        let report = RunReport {
            data_dir: data_dir.to_path_buf(),
            tokens,
        };
        info!(
            total = report.tokens.len(),
            invalid = report.invalid_count(),
            "validation finished"
        );
        Ok(report)
    }

    /// Validates `dirs`, yielding each token's report as soon as it and every
    /// token before it are done.
    pub fn reports(&self, dirs: Vec<PathBuf>) -> impl Stream<Item = TokenReport> + '_ {
        // `buffered` yields in input order whatever order the futures finish in
        stream::iter(dirs)
            .map(move |dir| async move { self.validate_token(&dir).await })
            .buffered(self.concurrency)
    }

    pub async fn validate_token(&self, dir: &Path) -> TokenReport {
        let name = dir_name(dir);
        let issues = match TokenDescriptor::load(dir).await {
            Ok(descriptor) => self.check(&descriptor, dir).await,
            Err(e) => vec![TokenIssue::from(e)],
        };

        debug!(token = %name, issues = issues.len(), "validated token");
        TokenReport {
            name,
            errors: issues.iter().map(ToString::to_string).collect(),
        }
    }

    async fn check(&self, descriptor: &TokenDescriptor, dir: &Path) -> Vec<TokenIssue> {
        let mut issues = self.schema.validate_dir(descriptor, dir);
        if let Some(reconciler) = &self.reconciler {
            issues.extend(reconciler.reconcile(descriptor).await);
        }
        issues
    }
}
