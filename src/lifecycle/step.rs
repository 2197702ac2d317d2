//! Declarative test cases

use std::collections::BTreeMap;

/// A named acceptance test: steps run in order, then teardown
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub steps: Vec<TestStep>,
    /// Substituted into every `%{var}` of the step configurations
    pub vars: BTreeMap<String, String>,
    /// Verify with the registered predicates that teardown removed everything
    pub check_destroy: bool,
}

impl TestCase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
            vars: BTreeMap::new(),
            check_destroy: true,
        }
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    pub fn check_destroy(mut self, check: bool) -> Self {
        self.check_destroy = check;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestStep {
    /// Apply a configuration, then run its checks
    Apply { config: String, checks: Vec<Check> },
    /// Import a resource by id and optionally compare it to the applied state
    Import {
        /// Address in the state, e.g. `google_tpu_node.tpu`
        resource_name: String,
        /// Import id; the instance's `id` attribute when unset
        import_id: Option<String>,
        verify: bool,
        /// Attribute keys excluded from verification (a key also covers its children)
        ignore: Vec<String>,
    },
}

impl TestStep {
    pub fn apply(config: impl Into<String>) -> Self {
        TestStep::Apply {
            config: config.into(),
            checks: Vec::new(),
        }
    }

    /// Import with verification and nothing ignored
    pub fn import(resource_name: &str) -> Self {
        TestStep::Import {
            resource_name: resource_name.to_string(),
            import_id: None,
            verify: true,
            ignore: Vec::new(),
        }
    }

    /// Add a check (apply steps only)
    pub fn check(mut self, check: Check) -> Self {
        if let TestStep::Apply { checks, .. } = &mut self {
            checks.push(check);
        }
        self
    }

    /// Ignore attribute keys during import verification (import steps only)
    pub fn ignore<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let TestStep::Import { ignore, .. } = &mut self {
            ignore.extend(keys.into_iter().map(Into::into));
        }
        self
    }

    pub fn import_id(mut self, id: &str) -> Self {
        if let TestStep::Import { import_id, .. } = &mut self {
            *import_id = Some(id.to_string());
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TestStep::Apply { .. } => "apply",
            TestStep::Import { .. } => "import",
        }
    }
}

/// Postcondition evaluated after an apply step
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// The registered predicate for this resource type reports it exists
    Exists(String),
    /// Attribute `key` of `address` equals `expected`
    Attribute {
        address: String,
        key: String,
        expected: String,
    },
    /// Attribute `key` of `address` has a non-empty value
    AttributeSet { address: String, key: String },
}

impl Check {
    pub fn exists(resource_type: &str) -> Self {
        Check::Exists(resource_type.to_string())
    }

    pub fn attribute(address: &str, key: &str, expected: &str) -> Self {
        Check::Attribute {
            address: address.to_string(),
            key: key.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn attribute_set(address: &str, key: &str) -> Self {
        Check::AttributeSet {
            address: address.to_string(),
            key: key.to_string(),
        }
    }
}
