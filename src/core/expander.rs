//! # Matrix Expander Module / 矩阵展开模块
//!
//! Parses factored name patterns such as `py{38,39}-{lint,fmt}` into an
//! explicit AST of literal segments and `FactorGroup`s, then expands them into
//! the ordered set of concrete environment names. Groups expand left to right
//! with the rightmost group varying fastest.
//!
//! 将诸如 `py{38,39}-{lint,fmt}` 的因子化名称模式解析为由字面量片段和
//! `FactorGroup` 组成的显式语法树，然后展开为有序的具体环境名称集合。
//! 分组从左到右展开，最右侧的分组变化最快。

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::config::{Fragment, MatrixDefinition, PatternFragment};
use crate::core::error::{ConfigError, PatternError};
use crate::core::models::EnvironmentSpec;

/// The ordered alternatives inside one brace group.
/// 一个花括号分组内的有序备选项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorGroup {
    tokens: Vec<String>,
}

impl FactorGroup {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// One piece of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Group(FactorGroup),
}

/// A parsed name pattern.
/// 已解析的名称模式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

/// A single name produced by expansion, with the token picked from each group.
/// 展开产生的单个名称，以及从每个分组中选取的 token。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedName {
    pub name: String,
    pub factors: Vec<String>,
}

impl Pattern {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of names this pattern denotes: the product of group cardinalities.
    pub fn cardinality(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(_) => 1,
                Segment::Group(group) => group.len(),
            })
            .product()
    }

    /// Expands into the cartesian product of all groups combined with the
    /// surrounding literal text, rightmost group varying fastest.
    ///
    /// 展开为所有分组与周围字面文本组合的笛卡尔积，最右侧的分组变化最快。
    pub fn expand(&self) -> Vec<ExpandedName> {
        let mut partial = vec![ExpandedName {
            name: String::new(),
            factors: Vec::new(),
        }];

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    for item in &mut partial {
                        item.name.push_str(text);
                    }
                }
                Segment::Group(group) => {
                    // Each existing prefix is extended by every token in order,
                    // so earlier groups form the outer loop.
                    let mut next = Vec::with_capacity(partial.len() * group.len());
                    for item in &partial {
                        for token in group.tokens() {
                            let mut name = item.name.clone();
                            name.push_str(token);
                            let mut factors = item.factors.clone();
                            factors.push(token.clone());
                            next.push(ExpandedName { name, factors });
                        }
                    }
                    partial = next;
                }
            }
        }

        partial
    }

    /// Convenience wrapper returning only the expanded names.
    pub fn expand_names(&self) -> Vec<String> {
        self.expand().into_iter().map(|e| e.name).collect()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Parses a pattern string into its `Pattern` AST.
///
/// Whitespace around alternatives inside a group is ignored, so
/// `py{38, 39}` is accepted. Names may only contain ASCII alphanumerics,
/// `-`, `_` and `.`.
///
/// 将模式字符串解析为 `Pattern` 语法树。
pub fn parse_pattern(input: &str) -> Result<Pattern, PatternError> {
    let source = input.trim();
    if source.is_empty() {
        return Err(PatternError::Empty);
    }

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                let mut tokens = Vec::new();
                let mut token = String::new();
                let mut closed = false;

                for (inner_offset, inner) in chars.by_ref() {
                    match inner {
                        '{' => return Err(PatternError::NestedGroup { offset: inner_offset }),
                        ',' | '}' => {
                            let trimmed = token.trim();
                            if trimmed.is_empty() {
                                if inner == '}' && tokens.is_empty() {
                                    return Err(PatternError::EmptyGroup { offset });
                                }
                                return Err(PatternError::EmptyToken { offset });
                            }
                            if trimmed.contains(char::is_whitespace) {
                                return Err(PatternError::InvalidCharacter {
                                    ch: ' ',
                                    offset: inner_offset,
                                });
                            }
                            tokens.push(trimmed.to_string());
                            token.clear();
                            if inner == '}' {
                                closed = true;
                                break;
                            }
                        }
                        c if c.is_whitespace() => token.push(c),
                        c if is_name_char(c) => token.push(c),
                        c => {
                            return Err(PatternError::InvalidCharacter {
                                ch: c,
                                offset: inner_offset,
                            });
                        }
                    }
                }

                if !closed {
                    return Err(PatternError::UnclosedGroup { offset });
                }
                segments.push(Segment::Group(FactorGroup { tokens }));
            }
            '}' => return Err(PatternError::UnexpectedClose { offset }),
            c if is_name_char(c) => literal.push(c),
            c => return Err(PatternError::InvalidCharacter { ch: c, offset }),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(Pattern {
        source: source.to_string(),
        segments,
    })
}

/// Rejects names that would not map to a directory of their own under the
/// install root: `.`, `..` and any other name starting with a dot.
fn check_name(expanded: &ExpandedName) -> Result<(), PatternError> {
    if expanded.name.starts_with('.') {
        return Err(PatternError::HiddenName {
            name: expanded.name.clone(),
        });
    }
    Ok(())
}

/// Expands a pattern string, mapping parse failures and unusable names to
/// `ConfigError::MalformedPattern`.
pub fn expand_pattern(pattern: &str) -> Result<Vec<ExpandedName>, ConfigError> {
    let malformed = |reason| ConfigError::MalformedPattern {
        pattern: pattern.to_string(),
        reason,
    };
    let names = parse_pattern(pattern).map_err(malformed)?.expand();
    names.iter().try_for_each(check_name).map_err(malformed)?;
    Ok(names)
}

/// The result of expanding a whole configuration.
/// 展开整个配置的结果。
#[derive(Debug, Clone)]
pub struct ExpandedMatrix {
    /// Every known environment, in spec order: envlist names first, then
    /// fragment-only names in declaration order.
    pub specs: Vec<Arc<EnvironmentSpec>>,
    /// The names produced by the envlist, in order.
    pub envlist: Vec<String>,
}

/// Turns a matrix definition and its fragments into resolved specs.
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expands the envlist and every fragment pattern, binds each name to the
    /// fragment that produced it, and resolves the result against the defaults.
    ///
    /// 展开 envlist 和每个片段模式，将每个名称绑定到产生它的片段，
    /// 并根据默认值解析结果。
    pub fn expand(
        matrix: &MatrixDefinition,
        defaults: &Fragment,
        fragments: &[PatternFragment],
    ) -> Result<ExpandedMatrix, ConfigError> {
        // Names claimed by fragments, in declaration order.
        let mut fragment_names: Vec<(ExpandedName, usize)> = Vec::new();
        let mut seen = HashSet::new();
        for (index, fragment) in fragments.iter().enumerate() {
            for expanded in expand_pattern(&fragment.pattern)? {
                if !seen.insert(expanded.name.clone()) {
                    return Err(ConfigError::DuplicateName {
                        name: expanded.name,
                    });
                }
                fragment_names.push((expanded, index));
            }
        }

        let mut envlist = Vec::new();
        let mut envlist_seen = HashSet::new();
        for pattern in matrix.patterns() {
            for expanded in expand_pattern(pattern)? {
                if !envlist_seen.insert(expanded.name.clone()) {
                    return Err(ConfigError::DuplicateName {
                        name: expanded.name,
                    });
                }
                envlist.push(expanded);
            }
        }

        let mut specs = Vec::with_capacity(envlist.len() + fragment_names.len());
        for expanded in &envlist {
            let bound = fragment_names
                .iter()
                .find(|(candidate, _)| candidate.name == expanded.name)
                .map(|(_, index)| &fragments[*index].fragment);
            let merged = match bound {
                Some(fragment) => fragment.inherit(defaults),
                None => defaults.clone(),
            };
            // Factors come from the envlist pattern that selected the name.
            specs.push(Arc::new(merged.resolve(&expanded.name, &expanded.factors)?));
        }

        for (expanded, index) in &fragment_names {
            if envlist_seen.contains(&expanded.name) {
                continue;
            }
            let merged = fragments[*index].fragment.inherit(defaults);
            specs.push(Arc::new(merged.resolve(&expanded.name, &expanded.factors)?));
        }

        tracing::debug!(
            envlist = envlist.len(),
            known = specs.len(),
            "expanded environment matrix"
        );

        Ok(ExpandedMatrix {
            specs,
            envlist: envlist.into_iter().map(|e| e.name).collect(),
        })
    }
}
