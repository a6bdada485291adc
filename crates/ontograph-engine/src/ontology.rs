//! The ontology workflow: `PROPOSED → MODIFIED* → FINALIZED`.
//!
//! Proposals are edited in place without touching the schema registry;
//! only [`Engine::finalize`] creates schemas.

use std::collections::HashSet;

use ontograph_core::{
  external::OntologyProposer,
  ontology::{OntologyDraft, OntologyEdit, Proposal},
  schema::{Schema, SchemaKind},
  store::{GraphStore, KnowledgeStore},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{BreakingPolicy, Engine, Error, Result};

/// A finalized proposal together with the schemas it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalized {
  pub proposal: Proposal,
  pub schemas:  Vec<Schema>,
}

impl<K, G> Engine<K, G>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  /// Ask the proposal generator for a draft and store it as `PROPOSED`.
  pub async fn propose<P: OntologyProposer>(
    &self,
    project_id: Uuid,
    proposer: &P,
    snippets: &[String],
  ) -> Result<Proposal> {
    self.get_project(project_id).await?;
    let draft = self
      .config
      .retry
      .once("propose_ontology", proposer.propose(snippets))
      .await
      .map_err(|f| f.into_external("ontology proposer"))?;
    self.submit(project_id, draft).await
  }

  /// Store a caller-supplied draft as a `PROPOSED` proposal.
  pub async fn submit(&self, project_id: Uuid, draft: OntologyDraft) -> Result<Proposal> {
    self.get_project(project_id).await?;
    let proposal = Proposal::new(project_id, draft);
    let proposal = self.store_once("insert_proposal", self.store.insert_proposal(proposal)).await?;
    info!(
      %project_id,
      proposal_id = %proposal.proposal_id,
      node_types = proposal.ontology.nodes.len(),
      edge_types = proposal.ontology.edges.len(),
      "ontology proposed",
    );
    Ok(proposal)
  }

  pub async fn get_proposal(&self, proposal_id: Uuid) -> Result<Proposal> {
    self
      .store_retry("get_proposal", || self.store.get_proposal(proposal_id))
      .await?
      .ok_or(Error::ProposalNotFound(proposal_id))
  }

  async fn save(&self, proposal: &Proposal) -> Result<()> {
    self.store_retry("save_proposal", || self.store.save_proposal(proposal.clone())).await
  }

  /// Mark the proposal as reviewed without changing it.
  pub async fn review(&self, proposal_id: Uuid) -> Result<Proposal> {
    let mut proposal = self.get_proposal(proposal_id).await?;
    proposal.review()?;
    self.save(&proposal).await?;
    Ok(proposal)
  }

  /// Apply edits to the draft. All edits apply or none do.
  pub async fn update(&self, proposal_id: Uuid, edits: &[OntologyEdit]) -> Result<Proposal> {
    let mut proposal = self.get_proposal(proposal_id).await?;
    proposal.update(edits)?;
    self.save(&proposal).await?;
    info!(%proposal_id, edits = edits.len(), "proposal modified");
    Ok(proposal)
  }

  /// Create (or reuse) one schema per proposed type.
  ///
  /// Finalizing a finalized proposal returns the schemas recorded the first
  /// time. A failure midway leaves the proposal open; running finalize again
  /// reuses the schemas already created.
  pub async fn finalize(&self, proposal_id: Uuid) -> Result<Finalized> {
    let mut proposal = self.get_proposal(proposal_id).await?;
    if proposal.is_finalized() {
      return self.recorded(proposal).await;
    }

    proposal.ensure_finalizable()?;
    self.check_edge_endpoints(&proposal).await?;

    let mut schemas = Vec::new();
    for definition in proposal.ontology.definitions() {
      let schema =
        self.create_schema(proposal.project_id, definition, &BreakingPolicy::Supersede).await?;
      schemas.push(schema);
    }

    proposal.mark_finalized(schemas.iter().map(|s| s.schema_id).collect());
    match self.save(&proposal).await {
      // A concurrent finalize got there first.
      Err(e) if matches!(e.core(), Some(ontograph_core::Error::ProposalFinalized(_))) => {
        return self.recorded(self.get_proposal(proposal_id).await?).await;
      }
      saved => saved?,
    }
    info!(
      project_id = %proposal.project_id,
      %proposal_id,
      schemas = schemas.len(),
      "ontology finalized",
    );
    Ok(Finalized { proposal, schemas })
  }

  async fn recorded(&self, proposal: Proposal) -> Result<Finalized> {
    let mut schemas = Vec::with_capacity(proposal.finalized_schema_ids.len());
    for id in &proposal.finalized_schema_ids {
      schemas.push(self.get_schema(*id).await?);
    }
    Ok(Finalized { proposal, schemas })
  }

  /// Every edge type must connect node types that exist either in the draft
  /// or as active node schemas of the project.
  async fn check_edge_endpoints(&self, proposal: &Proposal) -> Result<()> {
    let draft = &proposal.ontology;
    let mut known: HashSet<&str> = draft.nodes.iter().map(|n| n.schema_name.as_str()).collect();
    for edge in &draft.edges {
      for endpoint in [edge.from.as_str(), edge.to.as_str()] {
        if known.contains(endpoint) {
          continue;
        }
        let active = self.store_retry("get_active_schema", || {
          self.store.get_active_schema(proposal.project_id, endpoint)
        });
        match active.await? {
          Some(schema) if schema.kind == SchemaKind::Node => {
            known.insert(endpoint);
          }
          _ => return Err(ontograph_core::Error::UnknownType(endpoint.to_owned()).into()),
        }
      }
    }
    Ok(())
  }
}
