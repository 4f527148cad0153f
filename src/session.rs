// src/session.rs

use clap::ValueEnum;

use crate::error::AppError;
use crate::reformat::Reformatter;
use crate::retry::{RetryPolicy, Sleeper};
use crate::text_generation::{AnnotationMode, TextGenerator};

/// Docstring convention requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DocstringStyle {
    #[default]
    Google,
    Pep257,
}

impl DocstringStyle {
    pub fn mode(self) -> AnnotationMode {
        match self {
            DocstringStyle::Google => AnnotationMode::GoogleDocstring,
            DocstringStyle::Pep257 => AnnotationMode::Pep257Docstring,
        }
    }
}

/// How a function receives its docstring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Ask for the docstring only and insert it below the header.
    #[default]
    Insert,
    /// Ask for the whole function back with the docstring added.
    Rewrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotateOptions {
    pub style: DocstringStyle,
    pub strategy: Strategy,
    pub file_summary: bool,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            style: DocstringStyle::default(),
            strategy: Strategy::default(),
            file_summary: true,
        }
    }
}

/// Everything one run needs to talk to the outside world.
pub struct Session<'a> {
    pub generator: &'a dyn TextGenerator,
    pub sleeper: &'a dyn Sleeper,
    pub reformatter: &'a dyn Reformatter,
    pub retry: RetryPolicy,
    pub options: AnnotateOptions,
}

impl<'a> Session<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        sleeper: &'a dyn Sleeper,
        reformatter: &'a dyn Reformatter,
    ) -> Self {
        Self {
            generator,
            sleeper,
            reformatter,
            retry: RetryPolicy::default(),
            options: AnnotateOptions::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: AnnotateOptions) -> Self {
        self.options = options;
        self
    }

    /// Sends `content` under `mode`'s system role. `Ok(None)` means no usable answer.
    pub fn ask(&self, mode: AnnotationMode, content: &str) -> Result<Option<String>, AppError> {
        self.retry
            .call(self.generator, self.sleeper, mode.system_role(), content)
    }

    pub fn reformat(&self, code: &str) -> String {
        self.reformatter.reformat(code)
    }
}
