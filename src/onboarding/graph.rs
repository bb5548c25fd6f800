//! Static declaration of onboarding steps, their fields, and branching.
//!
//! All branch decisions live in [`WorkflowGraph::resolve_next`]; screens never
//! decide where to go next on their own.

use std::collections::BTreeSet;

use crate::error::GraphError;

use super::model::{fields, AccountType, ProfileDraft};
use super::state::StepId;

/// Result of resolving a step's successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Step(StepId),
    /// Past the last step; completing onboarding.
    Terminal,
}

/// How a step picks its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Successor {
    Fixed(NextStep),
    /// Branch point on `draft.accountType`.
    ByAccountType { individual: StepId, business: StepId },
}

/// One node of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub id: StepId,
    pub required_fields: BTreeSet<String>,
    pub optional_fields: BTreeSet<String>,
    pub successor: Successor,
}

impl StepRecord {
    pub fn new(id: StepId, successor: Successor) -> Self {
        Self {
            id,
            required_fields: BTreeSet::new(),
            optional_fields: BTreeSet::new(),
            successor,
        }
    }

    pub fn required<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.required_fields.extend(names.into_iter().map(String::from));
        self
    }

    pub fn optional<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.optional_fields.extend(names.into_iter().map(String::from));
        self
    }

    /// Every field this step is allowed to write.
    pub fn owned_fields(&self) -> impl Iterator<Item = &str> {
        self.required_fields
            .iter()
            .chain(self.optional_fields.iter())
            .map(String::as_str)
    }

    pub fn owns(&self, field: &str) -> bool {
        self.required_fields.contains(field) || self.optional_fields.contains(field)
    }

    fn successor_ids(&self) -> Vec<StepId> {
        match &self.successor {
            Successor::Fixed(NextStep::Step(id)) => vec![*id],
            Successor::Fixed(NextStep::Terminal) => vec![],
            Successor::ByAccountType {
                individual,
                business,
            } => vec![*individual, *business],
        }
    }
}

/// Ordered, validated collection of step records.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    initial: StepId,
    records: Vec<StepRecord>,
}

impl WorkflowGraph {
    /// Build a graph, rejecting duplicate ids and undeclared references.
    pub fn new(initial: StepId, records: Vec<StepRecord>) -> Result<Self, GraphError> {
        let mut seen = BTreeSet::new();
        for record in &records {
            if !seen.insert(record.id) {
                return Err(GraphError::DuplicateStep(record.id));
            }
        }
        if !seen.contains(&initial) {
            return Err(GraphError::UnknownStep(initial));
        }
        for record in &records {
            for to in record.successor_ids() {
                if !seen.contains(&to) {
                    return Err(GraphError::DanglingSuccessor {
                        from: record.id,
                        to,
                    });
                }
            }
        }
        Ok(Self { initial, records })
    }

    /// The marketplace registration flow.
    ///
    /// ```text
    /// AccountType ─┬─ Individual ─▶ UserDetails ─────┐
    ///              └─ Business ───▶ BusinessDetails ─┴▶ Portfolio ▶ Address ▶ VerificationDocument ▶ done
    /// ```
    pub fn standard() -> Self {
        use StepId::*;

        let records = vec![
            StepRecord::new(
                AccountType,
                Successor::ByAccountType {
                    individual: UserDetails,
                    business: BusinessDetails,
                },
            )
            .required([fields::ACCOUNT_TYPE]),
            StepRecord::new(UserDetails, Successor::Fixed(NextStep::Step(Portfolio)))
                .required([fields::FULL_NAME, fields::PHONE, fields::EMAIL])
                .optional([fields::AVATAR]),
            StepRecord::new(BusinessDetails, Successor::Fixed(NextStep::Step(Portfolio)))
                .required([
                    fields::BUSINESS_NAME,
                    fields::CONTACT_NAME,
                    fields::PHONE,
                    fields::EMAIL,
                ])
                .optional([fields::WEBSITE, fields::TAX_ID]),
            StepRecord::new(Portfolio, Successor::Fixed(NextStep::Step(Address)))
                .required([fields::PORTFOLIO])
                .optional([fields::BIO]),
            StepRecord::new(Address, Successor::Fixed(NextStep::Step(VerificationDocument)))
                .required([fields::ADDRESS]),
            StepRecord::new(VerificationDocument, Successor::Fixed(NextStep::Terminal))
                .required([fields::VERIFICATION_DOCUMENT]),
        ];

        // Checked by `standard_graph_passes_validation`.
        Self {
            initial: AccountType,
            records,
        }
    }

    pub fn initial_step(&self) -> StepId {
        self.initial
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn steps(&self) -> impl Iterator<Item = StepId> + '_ {
        self.records.iter().map(|r| r.id)
    }

    pub fn record(&self, id: StepId) -> Result<&StepRecord, GraphError> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .ok_or(GraphError::UnknownStep(id))
    }

    pub fn required_fields(&self, id: StepId) -> Result<&BTreeSet<String>, GraphError> {
        Ok(&self.record(id)?.required_fields)
    }

    pub fn optional_fields(&self, id: StepId) -> Result<&BTreeSet<String>, GraphError> {
        Ok(&self.record(id)?.optional_fields)
    }

    /// Deterministic successor of `id` given the draft.
    pub fn resolve_next(&self, id: StepId, draft: &ProfileDraft) -> Result<NextStep, GraphError> {
        match &self.record(id)?.successor {
            Successor::Fixed(next) => Ok(*next),
            Successor::ByAccountType {
                individual,
                business,
            } => match draft.account_type() {
                Some(AccountType::Individual) => Ok(NextStep::Step(*individual)),
                Some(AccountType::Business) => Ok(NextStep::Step(*business)),
                None => Err(GraphError::UnresolvedBranch(id)),
            },
        }
    }

    /// Whether `id` branches on prior answers.
    pub fn is_branch_point(&self, id: StepId) -> Result<bool, GraphError> {
        Ok(matches!(
            self.record(id)?.successor,
            Successor::ByAccountType { .. }
        ))
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_graph_passes_validation() {
        let graph = WorkflowGraph::standard();
        let rebuilt = WorkflowGraph::new(graph.initial, graph.records.clone());
        assert!(rebuilt.is_ok());
        assert_eq!(graph.steps().count(), StepId::ALL.len());
    }

    #[test]
    fn initial_step_is_account_type() {
        assert_eq!(WorkflowGraph::standard().initial_step(), StepId::AccountType);
    }

    #[test]
    fn account_type_branch_is_total() {
        let graph = WorkflowGraph::standard();
        for (account_type, expected) in [
            (AccountType::Individual, StepId::UserDetails),
            (AccountType::Business, StepId::BusinessDetails),
        ] {
            let draft = ProfileDraft::new().with(fields::ACCOUNT_TYPE, account_type);
            for _ in 0..3 {
                assert_eq!(
                    graph.resolve_next(StepId::AccountType, &draft).unwrap(),
                    NextStep::Step(expected)
                );
            }
        }
    }

    #[test]
    fn unresolved_branch_is_an_error() {
        let graph = WorkflowGraph::standard();
        let err = graph
            .resolve_next(StepId::AccountType, &ProfileDraft::new())
            .unwrap_err();
        assert_eq!(err, GraphError::UnresolvedBranch(StepId::AccountType));
    }

    #[test]
    fn fixed_successors_ignore_draft() {
        let graph = WorkflowGraph::standard();
        let empty = ProfileDraft::new();
        let business = ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Business);

        for draft in [&empty, &business] {
            assert_eq!(
                graph.resolve_next(StepId::UserDetails, draft).unwrap(),
                NextStep::Step(StepId::Portfolio)
            );
            assert_eq!(
                graph.resolve_next(StepId::Address, draft).unwrap(),
                NextStep::Step(StepId::VerificationDocument)
            );
            assert_eq!(
                graph.resolve_next(StepId::VerificationDocument, draft).unwrap(),
                NextStep::Terminal
            );
        }
    }

    #[test]
    fn user_details_requires_name_phone_email() {
        let graph = WorkflowGraph::standard();
        let required: Vec<&str> = graph
            .required_fields(StepId::UserDetails)
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(required, vec!["email", "fullName", "phone"]);
    }

    #[test]
    fn unknown_step_is_reported() {
        let graph = WorkflowGraph::new(
            StepId::AccountType,
            vec![StepRecord::new(
                StepId::AccountType,
                Successor::Fixed(NextStep::Terminal),
            )],
        )
        .unwrap();

        assert_eq!(
            graph.required_fields(StepId::Portfolio).unwrap_err(),
            GraphError::UnknownStep(StepId::Portfolio)
        );
        assert_eq!(
            graph
                .resolve_next(StepId::Portfolio, &ProfileDraft::new())
                .unwrap_err(),
            GraphError::UnknownStep(StepId::Portfolio)
        );
    }

    #[test]
    fn new_rejects_duplicates_and_dangling_successors() {
        let dup = WorkflowGraph::new(
            StepId::AccountType,
            vec![
                StepRecord::new(StepId::AccountType, Successor::Fixed(NextStep::Terminal)),
                StepRecord::new(StepId::AccountType, Successor::Fixed(NextStep::Terminal)),
            ],
        );
        assert_eq!(dup.unwrap_err(), GraphError::DuplicateStep(StepId::AccountType));

        let dangling = WorkflowGraph::new(
            StepId::AccountType,
            vec![StepRecord::new(
                StepId::AccountType,
                Successor::Fixed(NextStep::Step(StepId::Address)),
            )],
        );
        assert_eq!(
            dangling.unwrap_err(),
            GraphError::DanglingSuccessor {
                from: StepId::AccountType,
                to: StepId::Address
            }
        );

        let no_initial = WorkflowGraph::new(
            StepId::Portfolio,
            vec![StepRecord::new(
                StepId::AccountType,
                Successor::Fixed(NextStep::Terminal),
            )],
        );
        assert_eq!(no_initial.unwrap_err(), GraphError::UnknownStep(StepId::Portfolio));
    }

    #[test]
    fn ownership_includes_optional_fields() {
        let graph = WorkflowGraph::standard();
        let record = graph.record(StepId::BusinessDetails).unwrap();
        assert!(record.owns(fields::WEBSITE));
        assert!(record.owns(fields::EMAIL));
        assert!(!record.owns(fields::FULL_NAME));
        assert!(graph.is_branch_point(StepId::AccountType).unwrap());
        assert!(!graph.is_branch_point(StepId::Portfolio).unwrap());
    }
}
