use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::matcher::UrlMatcher;
use crate::error::ConfigError;
use crate::params::{Param, ParamDeclaration, ParamLocation, ParamTypes, Squash};

/// Settings shared by every compiled matcher and by URL generation.
#[derive(Debug, Clone)]
pub struct UrlConfig {
    pub case_insensitive: bool,
    /// When false, a trailing slash is accepted on every pattern.
    pub strict_mode: bool,
    pub default_squash_policy: Squash,
    pub html5_mode: bool,
    pub hash_prefix: String,
    pub base_url: String,
}

impl Default for UrlConfig {
    fn default() -> Self {
        UrlConfig {
            case_insensitive: false,
            strict_mode: true,
            default_squash_policy: Squash::Disabled,
            html5_mode: false,
            hash_prefix: String::new(),
            base_url: String::new(),
        }
    }
}

/// Compiles URL patterns against a shared type registry.
#[derive(Clone)]
pub struct UrlMatcherFactory {
    config: UrlConfig,
    types: Rc<RefCell<ParamTypes>>,
}

impl UrlMatcherFactory {
    pub fn new(config: UrlConfig, types: Rc<RefCell<ParamTypes>>) -> Self {
        UrlMatcherFactory { config, types }
    }

    pub fn config(&self) -> &UrlConfig {
        &self.config
    }

    pub fn types(&self) -> Rc<RefCell<ParamTypes>> {
        self.types.clone()
    }

    pub fn compile(&self, pattern: &str) -> Result<UrlMatcher, ConfigError> {
        UrlMatcher::compile(pattern, BTreeMap::new(), self.clone())
    }

    /// Compile with per-parameter declarations (types, defaults, squash...).
    pub fn compile_with(
        &self,
        pattern: &str,
        decls: &BTreeMap<String, ParamDeclaration>,
    ) -> Result<UrlMatcher, ConfigError> {
        UrlMatcher::compile(pattern, decls.clone(), self.clone())
    }

    /// Build a parameter that only exists on a state (never in a URL).
    pub fn config_param(&self, id: &str, decl: &ParamDeclaration) -> Result<Param, ConfigError> {
        Param::new(id, ParamLocation::Config, decl, &self.types.borrow(), &self.config.default_squash_policy)
    }
}
