//! Drives connection rules over resolved endpoints.

use crate::{
    error::{NetworkError, Result},
    nodes::Node,
    rule::{ConnectionRule, IterationStrategy, RuleOutput},
};

/// Visits the pairs selected by `iteration`, evaluates `rule` and forwards
/// every non-empty result to `emit`.
///
/// Counts of zero or below and empty property lists are dropped. The rule is
/// expected to have been checked against `iteration` already.
pub(crate) fn connect<'a, F>(
    declaration: usize,
    rule: &ConnectionRule,
    iteration: IterationStrategy,
    sources: &[Node<'a>],
    targets: &[Node<'a>],
    mut emit: F,
) -> Result<()>
where
    F: FnMut(&Node<'a>, &Node<'a>, RuleOutput) -> Result<()>,
{
    let mut forward = |source: &Node<'a>, target: &Node<'a>, output: RuleOutput| match output {
        RuleOutput::Count(count) if count <= 0 => Ok(()),
        RuleOutput::Edges(ref edges) if edges.is_empty() => Ok(()),
        output => emit(source, target, output),
    };

    match iteration {
        IterationStrategy::AllToAll => {
            let pairs = sources.len().saturating_mul(targets.len());
            let mut counts = PairCounts::new(declaration, rule, pairs)?;
            for source in sources {
                for target in targets {
                    forward(source, target, counts.next(rule, source, target))?;
                }
            }
        }
        IterationStrategy::OneToOne => {
            if sources.len() != targets.len() {
                return Err(NetworkError::CardinalityMismatch {
                    declaration,
                    sources: sources.len(),
                    targets: targets.len(),
                });
            }
            let mut counts = PairCounts::new(declaration, rule, sources.len())?;
            for (source, target) in sources.iter().zip(targets) {
                forward(source, target, counts.next(rule, source, target))?;
            }
        }
        IterationStrategy::OneToAll => {
            for source in sources {
                let outputs = pooled(declaration, rule, source, targets)?;
                for (target, output) in targets.iter().zip(outputs) {
                    forward(source, target, output)?;
                }
            }
        }
        IterationStrategy::AllToOne => {
            for target in targets {
                let outputs = pooled(declaration, rule, target, sources)?;
                for (source, output) in sources.iter().zip(outputs) {
                    forward(source, target, output)?;
                }
            }
        }
    }
    Ok(())
}

/// Per-pair evaluation for the pairwise strategies.
struct PairCounts<'r> {
    values: Option<std::slice::Iter<'r, i64>>,
}

impl<'r> PairCounts<'r> {
    fn new(declaration: usize, rule: &'r ConnectionRule, pairs: usize) -> Result<Self> {
        match rule {
            ConnectionRule::Values(values) if values.len() != pairs => {
                Err(NetworkError::RuleOutputLength {
                    declaration,
                    expected: pairs,
                    actual: values.len(),
                })
            }
            ConnectionRule::Values(values) => Ok(Self {
                values: Some(values.iter()),
            }),
            _ => Ok(Self { values: None }),
        }
    }

    fn next(&mut self, rule: &ConnectionRule, source: &Node<'_>, target: &Node<'_>) -> RuleOutput {
        match rule {
            ConnectionRule::Constant(count) => RuleOutput::Count(*count),
            ConnectionRule::Pairwise(rule) => rule(source, target),
            ConnectionRule::Values(_) => RuleOutput::Count(
                self.values
                    .as_mut()
                    .and_then(Iterator::next)
                    .copied()
                    .unwrap_or(0),
            ),
            ConnectionRule::Pooled(_) => RuleOutput::none(),
        }
    }
}

fn pooled(
    declaration: usize,
    rule: &ConnectionRule,
    anchor: &Node<'_>,
    pool: &[Node<'_>],
) -> Result<Vec<RuleOutput>> {
    let outputs = match rule {
        ConnectionRule::Constant(count) => vec![RuleOutput::Count(*count); pool.len()],
        ConnectionRule::Pooled(rule) => rule(anchor, pool),
        ConnectionRule::Pairwise(_) | ConnectionRule::Values(_) => {
            return Err(NetworkError::IncompatibleRule {
                rule: rule.name(),
                iteration: IterationStrategy::OneToAll,
            });
        }
    };
    if outputs.len() != pool.len() {
        return Err(NetworkError::RuleOutputLength {
            declaration,
            expected: pool.len(),
            actual: outputs.len(),
        });
    }
    Ok(outputs)
}
