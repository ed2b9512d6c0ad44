//! Declarative resource model: values, tokens, resources and stacks.
//!
//! A [`Token`] stands for an identifier that only exists after the provider
//! creates the resource (an id, an ARN, an endpoint). Builders pass tokens
//! between each other instead of literal strings; the synthesizer turns them
//! into intrinsics when rendering templates.

use crate::env::RemovalPolicy;
use crate::error::{ScoutError, ScoutResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

// ---------------------------------------------------------------------------
// Tokens and values
// ---------------------------------------------------------------------------

/// Late-bound reference to a resource, or to one of its attributes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token {
    pub stack: String,
    pub logical_id: String,
    pub attribute: Option<String>,
}

impl Token {
    pub fn reference(stack: &str, logical_id: &str) -> Self {
        Self {
            stack: stack.to_string(),
            logical_id: logical_id.to_string(),
            attribute: None,
        }
    }

    pub fn attr(stack: &str, logical_id: &str, attribute: &str) -> Self {
        Self {
            stack: stack.to_string(),
            logical_id: logical_id.to_string(),
            attribute: Some(attribute.to_string()),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attr) => write!(f, "${{{}/{}.{}}}", self.stack, self.logical_id, attr),
            None => write!(f, "${{{}/{}}}", self.stack, self.logical_id),
        }
    }
}

/// Property value inside a resource declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Token(Token),
    /// Concatenation with a delimiter; needed when a token sits inside a string.
    Join(String, Vec<Value>),
    /// Provider pseudo parameter such as `AWS::AccountId`.
    Pseudo(String),
}

impl Value {
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn concat<I: IntoIterator<Item = Value>>(parts: I) -> Self {
        Value::Join(String::new(), parts.into_iter().collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Value::Token(t) => Some(t),
            _ => None,
        }
    }

    /// Looks up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Every token reachable from this value, depth-first.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
        match self {
            Value::Token(t) => out.push(t),
            Value::List(items) | Value::Join(_, items) => {
                for item in items {
                    item.collect_tokens(out);
                }
            }
            Value::Map(m) => {
                for v in m.values() {
                    v.collect_tokens(out);
                }
            }
            Value::Str(_) | Value::Int(_) | Value::Bool(_) | Value::Pseudo(_) => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Token> for Value {
    fn from(t: Token) -> Self {
        Value::Token(t)
    }
}

impl From<&Token> for Value {
    fn from(t: &Token) -> Self {
        Value::Token(t.clone())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub logical_id: String,
    pub resource_type: String,
    pub properties: BTreeMap<String, Value>,
    /// Explicit creation dependencies on resources in the same stack.
    pub depends_on: BTreeSet<String>,
    pub removal: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(logical_id: &str, resource_type: &str) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            resource_type: resource_type.to_string(),
            properties: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            removal: None,
        }
    }

    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        self.depends_on.insert(logical_id.to_string());
        self
    }

    pub fn removal(mut self, policy: RemovalPolicy) -> Self {
        self.removal = Some(policy);
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Tokens used anywhere in the properties.
    pub fn tokens(&self) -> Vec<&Token> {
        self.properties.values().flat_map(Value::tokens).collect()
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// An independently deployable group of resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    /// Declaration order. Creation order is derived, see [`Stack::creation_order`].
    pub resources: Vec<Resource>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a resource and returns a `Ref` token to it.
    pub fn add(&mut self, resource: Resource) -> ScoutResult<Token> {
        if self.index.contains_key(&resource.logical_id) {
            return Err(ScoutError::Graph(format!(
                "duplicate logical id {} in stack {}",
                resource.logical_id, self.name
            )));
        }
        let token = Token::reference(&self.name, &resource.logical_id);
        self.index
            .insert(resource.logical_id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(token)
    }

    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.index.get(logical_id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.index.contains_key(logical_id)
    }

    pub fn attr(&self, logical_id: &str, attribute: &str) -> Token {
        Token::attr(&self.name, logical_id, attribute)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }

    /// In-stack predecessors of a resource: explicit `depends_on` plus every
    /// same-stack token in its properties.
    pub fn predecessors(&self, resource: &Resource) -> BTreeSet<String> {
        let mut deps = resource.depends_on.clone();
        for token in resource.tokens() {
            if token.stack == self.name {
                deps.insert(token.logical_id.clone());
            }
        }
        deps.remove(&resource.logical_id);
        deps
    }

    /// Topological creation order (Kahn). Ties keep declaration order.
    pub fn creation_order(&self) -> ScoutResult<Vec<&str>> {
        let n = self.resources.len();
        let mut indegree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, resource) in self.resources.iter().enumerate() {
            for dep in self.predecessors(resource) {
                let j = *self.index.get(&dep).ok_or_else(|| {
                    ScoutError::Graph(format!(
                        "{}/{} depends on unknown resource {dep}",
                        self.name, resource.logical_id
                    ))
                })?;
                successors[j].push(i);
                indegree[i] += 1;
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_front() {
            order.push(self.resources[i].logical_id.as_str());
            for &s in &successors[i] {
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    ready.push_back(s);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.resources[i].logical_id.as_str())
                .collect();
            return Err(ScoutError::Graph(format!(
                "dependency cycle in stack {} among {stuck:?}",
                self.name
            )));
        }
        Ok(order)
    }

    /// Rebuilds the id index after deserialization.
    pub fn reindex(&mut self) {
        self.index = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.logical_id.clone(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_logical_id_is_rejected() {
        let mut stack = Stack::new("S");
        stack.add(Resource::new("A", "T")).unwrap();
        assert!(matches!(
            stack.add(Resource::new("A", "T")),
            Err(ScoutError::Graph(_))
        ));
    }

    #[test]
    fn creation_order_follows_tokens_and_depends_on() {
        let mut stack = Stack::new("S");
        // Declared out of order on purpose.
        stack
            .add(Resource::new("C", "T").depends_on("A").depends_on("B"))
            .unwrap();
        stack
            .add(Resource::new("B", "T").prop("Parent", Token::reference("S", "A")))
            .unwrap();
        stack.add(Resource::new("A", "T")).unwrap();

        let order = stack.creation_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| *x == id).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("C"));
    }

    #[test]
    fn foreign_tokens_are_not_in_stack_predecessors() {
        let mut stack = Stack::new("S");
        stack
            .add(Resource::new("A", "T").prop("Vpc", Token::reference("Other", "Vpc")))
            .unwrap();
        assert_eq!(stack.creation_order().unwrap(), vec!["A"]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut stack = Stack::new("S");
        stack.add(Resource::new("A", "T").depends_on("B")).unwrap();
        stack.add(Resource::new("B", "T").depends_on("A")).unwrap();
        assert!(matches!(stack.creation_order(), Err(ScoutError::Graph(_))));
    }

    #[test]
    fn unknown_dependency_is_detected() {
        let mut stack = Stack::new("S");
        stack.add(Resource::new("A", "T").depends_on("Ghost")).unwrap();
        assert!(stack.creation_order().is_err());
    }

    #[test]
    fn tokens_found_inside_nested_values() {
        let v = Value::map([(
            "Outer",
            Value::list([Value::concat([
                Value::from("x"),
                Value::from(Token::attr("S", "R", "Arn")),
            ])]),
        )]);
        let tokens = v.tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].attribute.as_deref(), Some("Arn"));
    }
}
