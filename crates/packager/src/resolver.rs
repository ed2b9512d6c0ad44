//! Dependency resolution for the shared layer.
//!
//! Turns a declarative manifest (`pyproject.toml`) into a flat, pinned,
//! sorted requirement list that excludes the project itself and any other
//! local/workspace package. Runs before anything else in a pass so a bad
//! manifest fails cheaply.

use crate::marker::{self, Marker, LAYER_TARGET};
use scout_core::{PinnedRequirement, ScoutError, ScoutResult};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Lockfile read by [`LockfileResolver`], next to the manifest.
pub const LOCKFILE_NAME: &str = "uv.lock";

/// Produces pinned third-party requirements from a manifest.
pub trait DependencyResolver: Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, manifest_path: &Path) -> ScoutResult<Vec<PinnedRequirement>>;
}

/// `requirements.txt` body, one `name==version` per line.
pub fn render_requirements(requirements: &[PinnedRequirement]) -> String {
    let mut out = String::new();
    for r in requirements {
        out.push_str(&r.to_string());
        out.push('\n');
    }
    out
}

/// PEP 503 normalization: lowercase, runs of `-_.` collapse to `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PyProject {
    project: Option<ProjectTable>,
    #[serde(default)]
    tool: ToolTable,
}

#[derive(Debug, Deserialize)]
struct ProjectTable {
    name: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolTable {
    uv: Option<UvTable>,
}

#[derive(Debug, Deserialize)]
struct UvTable {
    workspace: Option<WorkspaceTable>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceTable {
    #[serde(default)]
    members: Vec<String>,
}

/// What the resolver needs from `pyproject.toml`.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub project_name: String,
    pub dependencies: Vec<Requirement>,
    /// Normalized names of the project and its workspace members.
    pub local_packages: BTreeSet<String>,
}

impl Manifest {
    pub fn load(manifest_path: &Path) -> ScoutResult<Self> {
        let text = fs::read_to_string(manifest_path).map_err(|e| {
            ScoutError::Resolution(format!("cannot read {}: {e}", manifest_path.display()))
        })?;
        let root = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, root)
    }

    /// Parses manifest text. `root` locates workspace member manifests.
    pub fn parse(text: &str, root: &Path) -> ScoutResult<Self> {
        let doc: PyProject = toml::from_str(text)
            .map_err(|e| ScoutError::Resolution(format!("invalid manifest: {e}")))?;
        let project = doc
            .project
            .ok_or_else(|| ScoutError::Resolution("manifest has no [project] table".into()))?;

        let dependencies = project
            .dependencies
            .iter()
            .map(|s| Requirement::parse(s))
            .collect::<ScoutResult<Vec<_>>>()?;

        let mut local_packages = BTreeSet::new();
        local_packages.insert(normalize_name(&project.name));
        let members = doc
            .tool
            .uv
            .and_then(|uv| uv.workspace)
            .map(|w| w.members)
            .unwrap_or_default();
        for dir in member_dirs(root, &members) {
            if let Some(name) = member_name(&dir) {
                local_packages.insert(normalize_name(&name));
            }
        }

        Ok(Self {
            project_name: project.name,
            dependencies,
            local_packages,
        })
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.local_packages.contains(&normalize_name(name))
    }
}

/// Expands literal member paths and `dir/*` globs.
fn member_dirs(root: &Path, members: &[String]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for member in members {
        match member.strip_suffix("/*") {
            Some(parent) => {
                if let Ok(entries) = fs::read_dir(root.join(parent)) {
                    let mut found: Vec<PathBuf> = entries
                        .filter_map(|e| e.ok().map(|e| e.path()))
                        .filter(|p| p.is_dir())
                        .collect();
                    found.sort();
                    dirs.extend(found);
                }
            }
            None => dirs.push(root.join(member)),
        }
    }
    dirs
}

fn member_name(dir: &Path) -> Option<String> {
    let text = fs::read_to_string(dir.join("pyproject.toml")).ok()?;
    let doc: PyProject = toml::from_str(&text).ok()?;
    doc.project.map(|p| p.name)
}

// ---------------------------------------------------------------------------
// Requirements and specifiers
// ---------------------------------------------------------------------------

/// A PEP 508 requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifiers: Vec<Specifier>,
    pub marker: Option<Marker>,
}

impl Requirement {
    pub fn parse(raw: &str) -> ScoutResult<Self> {
        let (body, marker) = match raw.split_once(';') {
            Some((body, marker)) => (body.trim(), Some(Marker::parse(marker.trim())?)),
            None => (raw.trim(), None),
        };
        let name_end = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(body.len());
        let name = &body[..name_end];
        if name.is_empty() {
            return Err(ScoutError::Resolution(format!("invalid requirement {raw:?}")));
        }

        let mut rest = body[name_end..].trim();
        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| {
                ScoutError::Resolution(format!("unterminated extras in {raw:?}"))
            })?;
            extras = after[..close]
                .split(',')
                .map(|e| normalize_name(e))
                .filter(|e| !e.is_empty())
                .collect();
            rest = after[close + 1..].trim();
        }

        // Direct references (`name @ url`) carry no version constraint.
        if rest.starts_with('@') {
            rest = "";
        }
        let rest = rest.trim_start_matches('(').trim_end_matches(')').trim();

        let specifiers = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',')
                .map(Specifier::parse)
                .collect::<ScoutResult<Vec<_>>>()?
        };

        Ok(Self {
            name: normalize_name(name),
            extras,
            specifiers,
            marker,
        })
    }

    pub fn allows(&self, version: &str) -> bool {
        self.specifiers.iter().all(|s| s.allows(version))
    }

    /// Whether the layer target installs this requirement at all.
    pub fn applies_to_layer(&self) -> bool {
        self.marker.as_ref().map_or(true, |m| m.evaluate(&LAYER_TARGET))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecOp {
    Eq,
    NotEq,
    Gte,
    Lte,
    Gt,
    Lt,
    Compatible,
    Arbitrary,
}

/// One version clause such as `>=1.34` or `==2.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub op: SpecOp,
    pub version: String,
}

impl Specifier {
    pub fn parse(raw: &str) -> ScoutResult<Self> {
        let raw = raw.trim();
        // Longest operators first.
        const OPS: [(&str, SpecOp); 8] = [
            ("===", SpecOp::Arbitrary),
            ("~=", SpecOp::Compatible),
            ("==", SpecOp::Eq),
            ("!=", SpecOp::NotEq),
            (">=", SpecOp::Gte),
            ("<=", SpecOp::Lte),
            (">", SpecOp::Gt),
            ("<", SpecOp::Lt),
        ];
        for (prefix, op) in OPS {
            if let Some(v) = raw.strip_prefix(prefix) {
                let version = v.trim().to_string();
                if version.is_empty() {
                    break;
                }
                let wildcard = version.ends_with(".*");
                let release = release_segments(&version);
                if op != SpecOp::Arbitrary && release.is_empty() {
                    return Err(ScoutError::Resolution(format!(
                        "version {version:?} in {raw:?} has no release segments"
                    )));
                }
                if op == SpecOp::Compatible && (wildcard || release.len() < 2) {
                    return Err(ScoutError::Resolution(format!(
                        "{raw:?}: `~=` needs a release with at least two segments"
                    )));
                }
                return Ok(Self { op, version });
            }
        }
        Err(ScoutError::Resolution(format!("invalid version specifier {raw:?}")))
    }

    pub fn allows(&self, candidate: &str) -> bool {
        if self.op == SpecOp::Arbitrary {
            return candidate == self.version;
        }
        if let Some(prefix) = self.version.strip_suffix(".*") {
            let matches = prefix_matches(prefix, candidate);
            return match self.op {
                SpecOp::Eq => matches,
                SpecOp::NotEq => !matches,
                _ => false,
            };
        }

        let ord = compare_versions(candidate, &self.version);
        match self.op {
            SpecOp::Eq => ord == Ordering::Equal,
            SpecOp::NotEq => ord != Ordering::Equal,
            SpecOp::Gte => ord != Ordering::Less,
            SpecOp::Lte => ord != Ordering::Greater,
            SpecOp::Gt => ord == Ordering::Greater,
            SpecOp::Lt => ord == Ordering::Less,
            SpecOp::Compatible => {
                let release = release_segments(&self.version);
                let keep = release.len().saturating_sub(1).max(1);
                match release.get(..keep) {
                    Some(head) => {
                        let prefix: Vec<String> = head.iter().map(u64::to_string).collect();
                        ord != Ordering::Less && prefix_matches(&prefix.join("."), candidate)
                    }
                    None => false,
                }
            }
            SpecOp::Arbitrary => unreachable!("handled above"),
        }
    }
}

impl std::fmt::Display for Specifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.op {
            SpecOp::Eq => "==",
            SpecOp::NotEq => "!=",
            SpecOp::Gte => ">=",
            SpecOp::Lte => "<=",
            SpecOp::Gt => ">",
            SpecOp::Lt => "<",
            SpecOp::Compatible => "~=",
            SpecOp::Arbitrary => "===",
        };
        write!(f, "{op}{}", self.version)
    }
}

/// Numeric release segments; pre/post/dev suffixes are ignored.
fn release_segments(version: &str) -> Vec<u64> {
    let version = version.trim().trim_start_matches('v');
    let version = version.split_once('!').map_or(version, |(_, v)| v);
    let mut out = Vec::new();
    for part in version.split('.') {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        match digits.parse() {
            Ok(n) => out.push(n),
            Err(_) => break,
        }
        if digits.len() != part.len() {
            break;
        }
    }
    out
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (release_segments(a), release_segments(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn prefix_matches(prefix: &str, candidate: &str) -> bool {
    let prefix = release_segments(prefix);
    let candidate = release_segments(candidate);
    prefix
        .iter()
        .enumerate()
        .all(|(i, p)| candidate.get(i).copied().unwrap_or(0) == *p)
}

// ---------------------------------------------------------------------------
// Lockfile resolver
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LockFile {
    #[serde(default, rename = "package")]
    packages: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
    version: Option<String>,
    #[serde(default)]
    source: BTreeMap<String, toml::Value>,
    #[serde(default)]
    dependencies: Vec<LockedDependency>,
    #[serde(default, rename = "optional-dependencies")]
    optional_dependencies: BTreeMap<String, Vec<LockedDependency>>,
}

impl LockedPackage {
    /// Editable, virtual and path sources are project code, not third-party.
    fn is_local_source(&self) -> bool {
        ["editable", "virtual", "directory", "path"]
            .iter()
            .any(|k| self.source.contains_key(*k))
    }
}

#[derive(Debug, Deserialize)]
struct LockedDependency {
    name: String,
    #[serde(default)]
    extra: Vec<String>,
    marker: Option<String>,
}

/// Resolves against the committed `uv.lock`; no network, no tools.
#[derive(Debug, Clone, Default)]
pub struct LockfileResolver;

impl LockfileResolver {
    pub fn new() -> Self {
        Self
    }

    /// Closure computation over already-loaded inputs.
    pub fn resolve_texts(
        &self,
        manifest: &Manifest,
        lock_text: &str,
    ) -> ScoutResult<Vec<PinnedRequirement>> {
        let lock: LockFile = toml::from_str(lock_text)
            .map_err(|e| ScoutError::Resolution(format!("invalid {LOCKFILE_NAME}: {e}")))?;

        let mut by_name: HashMap<String, &LockedPackage> = HashMap::new();
        for pkg in &lock.packages {
            let key = normalize_name(&pkg.name);
            if by_name.insert(key.clone(), pkg).is_some() {
                return Err(ScoutError::Resolution(format!(
                    "{key} is locked at more than one version; forked locks are not supported"
                )));
            }
        }

        let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::new();
        for req in &manifest.dependencies {
            if !req.applies_to_layer() {
                tracing::debug!(package = %req.name, "manifest requirement excluded by marker");
                continue;
            }
            let pkg = by_name.get(&req.name).ok_or_else(|| {
                ScoutError::Resolution(format!(
                    "{} is required by the manifest but missing from {LOCKFILE_NAME} (stale lock?)",
                    req.name
                ))
            })?;
            let locked = pkg.version.as_deref().unwrap_or("");
            if !pkg.is_local_source() && !req.allows(locked) {
                let wanted: Vec<String> = req.specifiers.iter().map(ToString::to_string).collect();
                return Err(ScoutError::Resolution(format!(
                    "{} is locked at {locked} which does not satisfy {}",
                    req.name,
                    wanted.join(", ")
                )));
            }
            queue.push_back((req.name.clone(), req.extras.clone()));
        }

        let mut visited: BTreeSet<(String, String)> = BTreeSet::new();
        let mut pinned: BTreeMap<String, PinnedRequirement> = BTreeMap::new();

        while let Some((name, extras)) = queue.pop_front() {
            let pkg = by_name.get(&name).ok_or_else(|| {
                ScoutError::Resolution(format!("{name} is referenced but not locked"))
            })?;

            // Base package plus each requested extra are visited once each.
            let mut groups: Vec<(String, &Vec<LockedDependency>)> = Vec::new();
            if visited.insert((name.clone(), String::new())) {
                groups.push((String::new(), &pkg.dependencies));
            }
            for extra in &extras {
                if !visited.insert((name.clone(), extra.clone())) {
                    continue;
                }
                match pkg
                    .optional_dependencies
                    .iter()
                    .find(|(k, _)| normalize_name(k) == *extra)
                {
                    Some((_, deps)) => groups.push((extra.clone(), deps)),
                    None => tracing::debug!(package = %name, extra = %extra, "extra not in lock"),
                }
            }

            let local = manifest.is_local(&name) || pkg.is_local_source();
            if !local {
                if let Some(version) = &pkg.version {
                    pinned.insert(
                        name.clone(),
                        PinnedRequirement {
                            name: name.clone(),
                            version: version.clone(),
                        },
                    );
                }
            }

            for (_, deps) in groups {
                for dep in deps {
                    if !marker::applies_to_layer(dep.marker.as_deref())? {
                        tracing::debug!(package = %name, dependency = %dep.name, "lock edge excluded by marker");
                        continue;
                    }
                    let extras = dep.extra.iter().map(|e| normalize_name(e)).collect();
                    queue.push_back((normalize_name(&dep.name), extras));
                }
            }
        }

        Ok(pinned.into_values().collect())
    }
}

impl DependencyResolver for LockfileResolver {
    fn name(&self) -> &str {
        "lock"
    }

    fn resolve(&self, manifest_path: &Path) -> ScoutResult<Vec<PinnedRequirement>> {
        let manifest = Manifest::load(manifest_path)?;
        let lock_path = manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(LOCKFILE_NAME);
        let lock_text = fs::read_to_string(&lock_path).map_err(|e| {
            ScoutError::Resolution(format!("cannot read {}: {e}", lock_path.display()))
        })?;

        let pinned = self.resolve_texts(&manifest, &lock_text)?;
        tracing::info!(
            project = %manifest.project_name,
            pinned = pinned.len(),
            "resolved layer requirements from lockfile"
        );
        Ok(pinned)
    }
}

// ---------------------------------------------------------------------------
// `uv pip compile` resolver
// ---------------------------------------------------------------------------

/// Shells out to `uv pip compile` and parses its pinned output.
#[derive(Debug, Clone)]
pub struct UvCompileResolver {
    program: String,
}

impl Default for UvCompileResolver {
    fn default() -> Self {
        Self {
            program: "uv".to_string(),
        }
    }
}

impl UvCompileResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Parses compiled output, dropping comments, editables and local packages.
pub fn parse_compiled(output: &str, manifest: &Manifest) -> ScoutResult<Vec<PinnedRequirement>> {
    let mut pinned = BTreeMap::new();
    for line in output.lines() {
        let line = line.split(" #").next().unwrap_or("").trim_end_matches('\\').trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        let (spec, condition) = match line.split_once(';') {
            Some((spec, condition)) => (spec.trim(), Some(condition)),
            None => (line, None),
        };
        if !marker::applies_to_layer(condition)? {
            continue;
        }
        let (name, version) = spec.split_once("==").ok_or_else(|| {
            ScoutError::Resolution(format!("unpinned line in compiled output: {line:?}"))
        })?;
        let name = normalize_name(name.split('[').next().unwrap_or(name));
        if manifest.is_local(&name) {
            continue;
        }
        pinned.insert(
            name.clone(),
            PinnedRequirement {
                name,
                version: version.trim().to_string(),
            },
        );
    }
    Ok(pinned.into_values().collect())
}

impl DependencyResolver for UvCompileResolver {
    fn name(&self) -> &str {
        "uv"
    }

    fn resolve(&self, manifest_path: &Path) -> ScoutResult<Vec<PinnedRequirement>> {
        let manifest = Manifest::load(manifest_path)?;
        let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let file = manifest_path
            .file_name()
            .ok_or_else(|| ScoutError::InvalidInput("manifest path has no file name".into()))?;

        let out = Command::new(&self.program)
            .args(["pip", "compile"])
            .arg(file)
            .args(["--no-header", "--color", "never"])
            .args(["--python-version", LAYER_TARGET.python_version])
            .args(["--python-platform", LAYER_TARGET.uv_platform])
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ScoutError::Resolution(format!("failed to run {}: {e}", self.program)))?;

        if !out.status.success() {
            return Err(ScoutError::Resolution(format!(
                "{} pip compile failed: {}",
                self.program,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let pinned = parse_compiled(&String::from_utf8_lossy(&out.stdout), &manifest)?;
        tracing::info!(project = %manifest.project_name, pinned = pinned.len(), "resolved layer requirements with uv");
        Ok(pinned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[project]
name = "rise-scout"
version = "0.1.0"
dependencies = [
    "boto3>=1.34",
    "redis[hiredis]>=5.0,<6",
    "pydantic-settings~=2.1",
    "aws_lambda_powertools >= 2.30 ; python_version >= '3.11'",
]
"#;

    const LOCK: &str = r#"
version = 1

[[package]]
name = "rise-scout"
version = "0.1.0"
source = { editable = "." }
dependencies = [
    { name = "boto3" },
    { name = "redis", extra = ["hiredis"] },
    { name = "pydantic-settings" },
    { name = "aws-lambda-powertools" },
]

[[package]]
name = "boto3"
version = "1.34.10"
source = { registry = "https://pypi.org/simple" }
dependencies = [{ name = "botocore" }, { name = "jmespath" }]

[[package]]
name = "botocore"
version = "1.34.10"
source = { registry = "https://pypi.org/simple" }
dependencies = [{ name = "jmespath" }]

[[package]]
name = "jmespath"
version = "1.0.1"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "redis"
version = "5.0.1"
source = { registry = "https://pypi.org/simple" }

[package.optional-dependencies]
hiredis = [{ name = "hiredis" }]

[[package]]
name = "hiredis"
version = "2.3.2"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "pydantic-settings"
version = "2.1.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "aws-lambda-powertools"
version = "2.30.2"
source = { registry = "https://pypi.org/simple" }
"#;

    fn manifest() -> Manifest {
        Manifest::parse(MANIFEST, Path::new(".")).unwrap()
    }

    #[test]
    fn closure_is_sorted_pinned_and_excludes_project() {
        let pinned = LockfileResolver.resolve_texts(&manifest(), LOCK).unwrap();
        let lines: Vec<String> = pinned.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "aws-lambda-powertools==2.30.2",
                "boto3==1.34.10",
                "botocore==1.34.10",
                "hiredis==2.3.2",
                "jmespath==1.0.1",
                "pydantic-settings==2.1.0",
                "redis==5.0.1",
            ]
        );
        assert!(pinned.iter().all(|r| r.name != "rise-scout"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = LockfileResolver.resolve_texts(&manifest(), LOCK).unwrap();
        let b = LockfileResolver.resolve_texts(&manifest(), LOCK).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unsatisfied_constraint_fails() {
        let m = Manifest::parse(
            "[project]\nname = \"rise-scout\"\ndependencies = [\"boto3>=2\"]\n",
            Path::new("."),
        )
        .unwrap();
        let err = LockfileResolver.resolve_texts(&m, LOCK).unwrap_err();
        assert!(matches!(err, ScoutError::Resolution(_)));
        assert!(err.to_string().contains(">=2"));
    }

    #[test]
    fn missing_locked_package_fails() {
        let m = Manifest::parse(
            "[project]\nname = \"x\"\ndependencies = [\"numpy\"]\n",
            Path::new("."),
        )
        .unwrap();
        assert!(LockfileResolver.resolve_texts(&m, LOCK).is_err());
    }

    #[test]
    fn project_listed_as_dependency_is_still_excluded() {
        let m = Manifest::parse(
            "[project]\nname = \"Rise_Scout\"\ndependencies = [\"rise-scout\", \"jmespath\"]\n",
            Path::new("."),
        )
        .unwrap();
        let pinned = LockfileResolver.resolve_texts(&m, LOCK).unwrap();
        let names: Vec<&str> = pinned.iter().map(|r| r.name.as_str()).collect();
        assert!(!names.contains(&"rise-scout"));
        assert!(names.contains(&"jmespath"));
        assert!(names.contains(&"boto3"));
    }

    #[test]
    fn workspace_members_are_local() {
        let root = tempfile::tempdir().unwrap();
        let member = root.path().join("packages/scoring");
        fs::create_dir_all(&member).unwrap();
        fs::write(
            member.join("pyproject.toml"),
            "[project]\nname = \"scout-scoring\"\n",
        )
        .unwrap();
        let m = Manifest::parse(
            "[project]\nname = \"rise-scout\"\n[tool.uv.workspace]\nmembers = [\"packages/*\"]\n",
            root.path(),
        )
        .unwrap();
        assert!(m.is_local("scout_scoring"));
        assert!(m.is_local("rise-scout"));
    }

    #[test]
    fn requirement_parsing() {
        let r = Requirement::parse("Redis[HiRedis] (>=5.0, <6) ; sys_platform == 'linux'").unwrap();
        assert_eq!(r.name, "redis");
        assert_eq!(r.extras, vec!["hiredis"]);
        assert_eq!(r.specifiers.len(), 2);
        assert!(r.allows("5.0.1"));
        assert!(!r.allows("6.0.0"));

        let direct = Requirement::parse("pkg @ https://example.com/pkg.whl").unwrap();
        assert!(direct.specifiers.is_empty());
    }

    #[test]
    fn specifier_semantics() {
        let compat = Specifier::parse("~=2.1").unwrap();
        assert!(compat.allows("2.9.0"));
        assert!(!compat.allows("3.0"));
        assert!(!compat.allows("2.0.9"));

        let compat3 = Specifier::parse("~=1.4.5").unwrap();
        assert!(compat3.allows("1.4.9"));
        assert!(!compat3.allows("1.5.0"));

        let wildcard = Specifier::parse("==2.*").unwrap();
        assert!(wildcard.allows("2.8.2.post1"));
        assert!(!wildcard.allows("3.0"));

        assert!(Specifier::parse("!=1.0").unwrap().allows("1.0.1"));
        assert!(Specifier::parse("==1.0").unwrap().allows("1.0.0"));
        assert!(Specifier::parse("oops").is_err());
    }

    #[test]
    fn compatible_release_needs_numeric_segments() {
        for raw in ["~=latest", "~=1", "~=2.*", ">=next", "==dev"] {
            let err = Specifier::parse(raw).unwrap_err();
            assert!(matches!(err, ScoutError::Resolution(_)), "{raw}");
        }
        assert!(Specifier::parse("===latest").is_ok());

        let err = Requirement::parse("boto3~=latest").unwrap_err();
        assert!(matches!(err, ScoutError::Resolution(_)));
        let err = Manifest::parse(
            "[project]\nname = \"x\"\ndependencies = [\"boto3~=latest\"]\n",
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, ScoutError::Resolution(_)));
    }

    const PLATFORM_LOCK: &str = r#"
version = 1

[[package]]
name = "portalocker"
version = "2.8.2"
source = { registry = "https://pypi.org/simple" }
dependencies = [
    { name = "pywin32", marker = "sys_platform == 'win32'" },
    { name = "typing-extensions", marker = "python_version < '3.11'" },
    { name = "jmespath", marker = "platform_system == 'Linux' and python_version >= '3.8'" },
]

[[package]]
name = "pywin32"
version = "306"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "typing-extensions"
version = "4.9.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "jmespath"
version = "1.0.1"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "appnope"
version = "0.1.3"
source = { registry = "https://pypi.org/simple" }
"#;

    #[test]
    fn lock_edges_for_other_platforms_are_dropped() {
        let m = Manifest::parse(
            "[project]\nname = \"rise-scout\"\ndependencies = [\n  \"portalocker>=2\",\n  \"appnope ; sys_platform == 'darwin'\",\n]\n",
            Path::new("."),
        )
        .unwrap();
        let pinned = LockfileResolver.resolve_texts(&m, PLATFORM_LOCK).unwrap();
        let lines: Vec<String> = pinned.iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["jmespath==1.0.1", "portalocker==2.8.2"]);
    }

    #[test]
    fn malformed_lock_marker_fails_resolution() {
        let lock = PLATFORM_LOCK.replace("sys_platform == 'win32'", "sys_platform ==");
        let m = Manifest::parse(
            "[project]\nname = \"x\"\ndependencies = [\"portalocker\"]\n",
            Path::new("."),
        )
        .unwrap();
        let err = LockfileResolver.resolve_texts(&m, &lock).unwrap_err();
        assert!(matches!(err, ScoutError::Resolution(_)));
    }

    #[test]
    fn normalize_names() {
        assert_eq!(normalize_name("Pydantic_Settings"), "pydantic-settings");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("a--_b"), "a-b");
    }

    #[test]
    fn parse_uv_compile_output() {
        let output = "\
boto3==1.34.10
    # via rise-scout
botocore==1.34.10 \\
    # via boto3
-e .
redis[hiredis]==5.0.1 ; python_version >= '3.11'
pywin32==306 ; sys_platform == 'win32'
rise-scout==0.1.0
";
        let pinned = parse_compiled(output, &manifest()).unwrap();
        let lines: Vec<String> = pinned.iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["boto3==1.34.10", "botocore==1.34.10", "redis==5.0.1"]);
    }

    #[test]
    fn render_requirement_file() {
        let reqs = vec![
            PinnedRequirement { name: "a".into(), version: "1".into() },
            PinnedRequirement { name: "b".into(), version: "2".into() },
        ];
        assert_eq!(render_requirements(&reqs), "a==1\nb==2\n");
    }
}
