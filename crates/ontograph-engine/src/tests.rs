//! End-to-end tests for the engine over an in-memory SQLite store and the
//! in-memory graph.

use std::{
  convert::Infallible,
  sync::{Arc, Mutex},
};

use ontograph_core::{
  document::{Chunk, Document, NewChunk},
  external::{Embedder, EntityExtractor, ExtractedEntity, WindowChunker},
  graph::{Edge, EdgeKey, NewEdge, NewNode, Node},
  ontology::{EdgeTypeDraft, NodeTypeDraft, OntologyDraft, OntologyEdit, Proposal},
  project::{NewProject, Project, UsageCounter},
  schema::{AttributeDefinition, DataType, Schema, SchemaDefinition, SchemaEdit, SchemaKind, VectorConfig},
  store::{
    GraphStore, KnowledgeStore, MergeOutcome, RelationshipUpsert, Transient, UpsertOutcome, VertexUpsert,
  },
  version::{SemVer, is_compatible},
};
use ontograph_graph_mem::MemoryGraph;
use ontograph_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{BreakingPolicy, Engine, EngineConfig, Error, Mention, PipelineOptions, SyncItem};

type TestEngine<G = MemoryGraph> = Engine<SqliteStore, G>;

async fn engine_with<G: GraphStore>(graph: G) -> TestEngine<G> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Engine::new(Arc::new(store), Arc::new(graph), EngineConfig::default())
}

async fn engine() -> TestEngine { engine_with(MemoryGraph::new()).await }

async fn project<G: GraphStore>(engine: &TestEngine<G>) -> Uuid {
  engine.create_project(NewProject::named("test")).await.unwrap().project_id
}

fn mention(chunk_id: Uuid, type_label: &str, surface_text: &str) -> Mention {
  Mention {
    chunk_id,
    entity: ExtractedEntity {
      type_label:   type_label.into(),
      surface_text: surface_text.into(),
      confidence:   0.9,
      span:         None,
    },
  }
}

fn person() -> SchemaDefinition {
  SchemaDefinition::node("Person").with_attribute(AttributeDefinition::required("name", DataType::String))
}

fn core_error(e: &Error) -> &ontograph_core::Error { e.core().expect("a domain error") }

// ─── Schema registry ─────────────────────────────────────────────────────────

#[tokio::test]
async fn versioning_follows_the_size_of_the_change() {
  let e = engine().await;
  let p = project(&e).await;
  let supersede = BreakingPolicy::Supersede;

  let v1 = e.create_schema(p, person(), &supersede).await.unwrap();
  assert_eq!(v1.version, SemVer::new(1, 0, 0));

  let with_email =
    person().with_attribute(AttributeDefinition::optional("email", DataType::String));
  let v11 = e.create_schema(p, with_email, &supersede).await.unwrap();
  assert_eq!(v11.version, SemVer::new(1, 1, 0));
  assert!(is_compatible(&v1.version, &v11.version));

  // Data written against 1.0.0 is still valid.
  let ada = json!({ "name": "Ada" });
  assert!(e.validate_pinned(v1.schema_id, &ada).await.is_ok());
  assert!(e.validate(p, "Person", &ada).await.is_ok());

  let v2 = e
    .evolve_schema(
      p,
      "Person",
      &[SchemaEdit::SetRequired { name: "email".into(), required: true }],
      &supersede,
    )
    .await
    .unwrap();
  assert_eq!(v2.version, SemVer::new(2, 0, 0));
  assert!(!is_compatible(&v11.version, &v2.version));

  let history: Vec<_> =
    e.schema_history(p, "Person").await.unwrap().into_iter().map(|s| (s.version, s.is_active)).collect();
  assert_eq!(history, [
    (SemVer::new(1, 0, 0), false),
    (SemVer::new(1, 1, 0), false),
    (SemVer::new(2, 0, 0), true),
  ]);
}

#[tokio::test]
async fn identical_definitions_do_not_create_versions() {
  let e = engine().await;
  let p = project(&e).await;
  let first = e.create_schema(p, person(), &BreakingPolicy::Supersede).await.unwrap();
  let again = e.create_schema(p, person(), &BreakingPolicy::Supersede).await.unwrap();
  assert_eq!(first.schema_id, again.schema_id);
  assert_eq!(e.schema_history(p, "Person").await.unwrap().len(), 1);
}

#[tokio::test]
async fn new_versions_do_not_change_validation_against_old_ones() {
  let e = engine().await;
  let p = project(&e).await;
  let v1 = e.create_schema(p, person(), &BreakingPolicy::Supersede).await.unwrap();

  let payloads = [json!({ "name": "Ada" }), json!({}), json!({ "name": 5 }), json!({ "name": "A", "x": 1 })];
  let mut before = Vec::new();
  for data in &payloads {
    before.push(e.validate_pinned(v1.schema_id, data).await.ok());
  }

  let breaking = person().with_attribute(AttributeDefinition::required("email", DataType::String)).strict();
  e.create_schema(p, breaking, &BreakingPolicy::Supersede).await.unwrap();

  for (data, expected) in payloads.iter().zip(before) {
    assert_eq!(e.validate_pinned(v1.schema_id, data).await.ok(), expected, "{data}");
  }
  let err = e.validate(p, "Person", &json!({ "name": "Ada" })).await.unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::Validation(_)));
}

#[tokio::test]
async fn forking_keeps_the_old_version_active() {
  let e = engine().await;
  let p = project(&e).await;
  let v1 = e.create_schema(p, person(), &BreakingPolicy::Supersede).await.unwrap();

  let breaking = person().with_attribute(AttributeDefinition::required("born", DataType::Date));
  let fork = BreakingPolicy::Fork { name: "PersonV2".into() };
  let forked = e.create_schema(p, breaking.clone(), &fork).await.unwrap();

  assert_eq!(forked.schema_name, "PersonV2");
  assert_eq!(forked.version, SemVer::new(2, 0, 0));
  assert_eq!(e.get_active_schema(p, "Person").await.unwrap().schema_id, v1.schema_id);

  // The fork target is taken now.
  let err = e.create_schema(p, breaking, &fork).await.unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::ActiveSchemaExists(n) if n == "PersonV2"));
}

#[tokio::test]
async fn kinds_are_fixed_per_name() {
  let e = engine().await;
  let p = project(&e).await;
  e.create_schema(p, person(), &BreakingPolicy::Supersede).await.unwrap();

  let err = e.ensure_schema(p, "Person", SchemaKind::Edge).await.unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::SchemaKindConflict { .. }));

  let err = e
    .create_schema(p, SchemaDefinition::edge("Person"), &BreakingPolicy::Supersede)
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::SchemaKindConflict { .. }));
}

#[tokio::test]
async fn unknown_projects_are_reported() {
  let e = engine().await;
  let err = e.create_schema(Uuid::new_v4(), person(), &BreakingPolicy::Supersede).await.unwrap_err();
  assert!(matches!(err, Error::ProjectNotFound(_)));
}

// ─── Ontology workflow ───────────────────────────────────────────────────────

fn draft() -> OntologyDraft {
  OntologyDraft {
    nodes: vec![
      NodeTypeDraft {
        schema_name: "Person".into(),
        attributes:  vec![AttributeDefinition::required("name", DataType::String)],
      },
      NodeTypeDraft { schema_name: "Paper".into(), attributes: vec![] },
    ],
    edges: vec![EdgeTypeDraft {
      schema_name: "AUTHORED".into(),
      from:        "Person".into(),
      to:          "Paper".into(),
      attributes:  vec![],
    }],
  }
}

#[tokio::test]
async fn finalize_requires_review_and_is_idempotent() {
  let e = engine().await;
  let p = project(&e).await;
  let proposal = e.submit(p, draft()).await.unwrap();

  let err = e.finalize(proposal.proposal_id).await.unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::ProposalNotReviewed(_)));
  assert!(e.list_schemas(p, false).await.unwrap().is_empty());

  e.review(proposal.proposal_id).await.unwrap();
  let first = e.finalize(proposal.proposal_id).await.unwrap();
  assert_eq!(first.schemas.len(), 3);
  assert!(first.proposal.is_finalized());
  assert_eq!(first.schemas[2].kind, SchemaKind::Edge);

  let again = e.finalize(proposal.proposal_id).await.unwrap();
  let ids = |f: &crate::Finalized| f.schemas.iter().map(|s| s.schema_id).collect::<Vec<_>>();
  assert_eq!(ids(&first), ids(&again));
  assert_eq!(e.list_schemas(p, false).await.unwrap().len(), 3);

  let err = e
    .update(proposal.proposal_id, &[OntologyEdit::RemoveEdgeType { schema_name: "AUTHORED".into() }])
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::ProposalFinalized(_)));
}

#[tokio::test]
async fn a_stale_copy_cannot_reopen_a_finalized_proposal() {
  let e = engine().await;
  let p = project(&e).await;
  let proposal = e.submit(p, draft()).await.unwrap();
  let mut stale = e.get_proposal(proposal.proposal_id).await.unwrap();

  e.review(proposal.proposal_id).await.unwrap();
  let finalized = e.finalize(proposal.proposal_id).await.unwrap();

  stale.update(&[OntologyEdit::RemoveEdgeType { schema_name: "AUTHORED".into() }]).unwrap();
  let err = e.store().save_proposal(stale).await.unwrap_err();
  assert!(matches!(
    err,
    ontograph_store_sqlite::Error::Core(ontograph_core::Error::ProposalFinalized(_))
  ));

  let stored = e.get_proposal(proposal.proposal_id).await.unwrap();
  assert!(stored.is_finalized());
  assert_eq!(stored.ontology.edges.len(), 1);
  assert_eq!(stored.finalized_schema_ids, finalized.proposal.finalized_schema_ids);
  let again = e.finalize(proposal.proposal_id).await.unwrap();
  assert_eq!(again.schemas.len(), 3);
}

#[tokio::test]
async fn edits_are_applied_and_reviewed() {
  let e = engine().await;
  let p = project(&e).await;
  let proposal = e.submit(p, draft()).await.unwrap();

  let updated = e
    .update(proposal.proposal_id, &[
      OntologyEdit::RenameNodeType { from: "Paper".into(), to: "Article".into() },
      OntologyEdit::AddAttribute {
        schema_name: "Article".into(),
        attribute:   AttributeDefinition::optional("year", DataType::Int),
      },
    ])
    .await
    .unwrap();
  assert!(updated.reviewed);
  assert_eq!(updated.ontology.edges[0].to, "Article");

  // A bad edit leaves the stored proposal as it was.
  let err = e
    .update(proposal.proposal_id, &[OntologyEdit::RemoveNodeType { schema_name: "Nope".into() }])
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::UnknownType(_)));
  assert_eq!(e.get_proposal(proposal.proposal_id).await.unwrap().ontology, updated.ontology);

  let finalized = e.finalize(proposal.proposal_id).await.unwrap();
  let article = finalized.schemas.iter().find(|s| s.schema_name == "Article").unwrap();
  assert!(article.attribute("year").is_some());
}

#[tokio::test]
async fn edge_types_need_known_endpoints() {
  let e = engine().await;
  let p = project(&e).await;
  let mut bad = draft();
  bad.edges[0].to = "Venue".into();
  let proposal = e.submit(p, bad).await.unwrap();
  e.review(proposal.proposal_id).await.unwrap();

  let err = e.finalize(proposal.proposal_id).await.unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::UnknownType(t) if t == "Venue"));
  assert!(!e.get_proposal(proposal.proposal_id).await.unwrap().is_finalized());

  // An active node schema of the project also counts.
  e.create_schema(p, SchemaDefinition::node("Venue"), &BreakingPolicy::Supersede).await.unwrap();
  assert!(e.finalize(proposal.proposal_id).await.is_ok());
}

#[tokio::test]
async fn finalizing_the_same_types_twice_reuses_schemas() {
  let e = engine().await;
  let p = project(&e).await;
  let mut ids = Vec::new();
  for _ in 0..2 {
    let proposal = e.submit(p, draft()).await.unwrap();
    e.review(proposal.proposal_id).await.unwrap();
    ids.push(e.finalize(proposal.proposal_id).await.unwrap().proposal.finalized_schema_ids);
  }
  assert_eq!(ids[0], ids[1]);
}

// ─── Graph construction ──────────────────────────────────────────────────────

#[tokio::test]
async fn mentions_are_deduplicated_into_nodes_and_edges() {
  let e = engine().await;
  let p = project(&e).await;
  let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
  let batch = vec![
    mention(c1, "Person", "Ada Lovelace"),
    mention(c1, "Person", "Charles Babbage"),
    mention(c1, "Person", "ada  lovelace"),
    mention(c2, "Person", " ADA LOVELACE "),
    mention(c2, "Person", "Charles Babbage"),
  ];

  let report = e.build_graph(p, batch.clone(), &PipelineOptions::default()).await.unwrap();
  assert_eq!(report.mentions_received, 5);
  assert_eq!(report.nodes_created, 2);
  assert_eq!(report.nodes_reused, 0);
  assert_eq!(report.edges_created, 1);
  assert_eq!(report.edges_skipped_as_duplicate, 1);
  assert!(report.errors.is_empty());

  let ada = e.store().find_node(p, "Person", "ada lovelace").await.unwrap().unwrap();
  assert_eq!(ada.node_name, "Ada Lovelace");
  assert_eq!(ada.metadata["mention_count"], json!(3));
  assert_eq!(ada.metadata["first_chunk_id"], json!(c1));
  assert_eq!(ada.metadata["surface_forms"].as_array().unwrap().len(), 3);

  // Processing the same batch again reuses everything.
  let again = e.build_graph(p, batch, &PipelineOptions::default()).await.unwrap();
  assert_eq!(again.nodes_created, 0);
  assert_eq!(again.nodes_reused, 2);
  assert_eq!(again.edges_created, 0);
  assert_eq!(again.edges_skipped_as_duplicate, 2);
  assert_eq!(e.store().count_nodes(p).await.unwrap(), 2);
  assert_eq!(e.store().count_edges(p).await.unwrap(), 1);

  let project = e.get_project(p).await.unwrap();
  assert_eq!(project.usage(UsageCounter::Nodes), 2);
  assert_eq!(project.usage(UsageCounter::Edges), 1);
}

#[tokio::test]
async fn pair_order_does_not_matter_for_undirected_edges() {
  let e = engine().await;
  let p = project(&e).await;
  let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
  let first = vec![mention(c1, "Person", "Ada"), mention(c1, "Person", "Charles")];
  let second = vec![mention(c2, "Person", "Charles"), mention(c2, "Person", "Ada")];

  e.build_graph(p, first, &PipelineOptions::default()).await.unwrap();
  let report = e.build_graph(p, second, &PipelineOptions::default()).await.unwrap();
  assert_eq!(report.edges_created, 0);
  assert_eq!(e.store().count_edges(p).await.unwrap(), 1);

  let edge_schema = e.get_active_schema(p, "CO_OCCURS_WITH").await.unwrap();
  assert_eq!(edge_schema.kind, SchemaKind::Edge);
}

#[tokio::test]
async fn malformed_mentions_are_skipped_not_fatal() {
  let e = engine().await;
  let p = project(&e).await;
  let c = Uuid::new_v4();
  let batch = vec![
    mention(c, "Person", "   "),
    mention(c, "", "Ada"),
    mention(c, "Person", "Ada"),
  ];
  let report = e.build_graph(p, batch, &PipelineOptions::default()).await.unwrap();
  assert_eq!(report.mentions_skipped, 2);
  assert_eq!(report.nodes_created, 1);
  assert_eq!(report.errors[0].reason, "empty surface text");
  assert!(report.errors[1].reason.contains("empty"));
}

#[tokio::test]
async fn labels_naming_edge_schemas_are_skipped() {
  let e = engine().await;
  let p = project(&e).await;
  e.create_schema(p, SchemaDefinition::edge("KNOWS"), &BreakingPolicy::Supersede).await.unwrap();
  let c = Uuid::new_v4();
  let report = e
    .build_graph(p, vec![mention(c, "KNOWS", "x"), mention(c, "Person", "Ada")], &PipelineOptions::default())
    .await
    .unwrap();
  assert_eq!(report.mentions_skipped, 1);
  assert_eq!(report.errors[0].type_label, "KNOWS");
  assert_eq!(report.nodes_created, 1);
}

#[tokio::test]
async fn nodes_fill_the_name_attribute_of_their_schema() {
  let e = engine().await;
  let p = project(&e).await;
  e.create_schema(p, person(), &BreakingPolicy::Supersede).await.unwrap();
  let report = e
    .build_graph(p, vec![mention(Uuid::new_v4(), "Person", "Ada  Lovelace")], &PipelineOptions::default())
    .await
    .unwrap();
  let node = e.store().get_node(report.node_ids[0]).await.unwrap().unwrap();
  assert_eq!(node.structured_data, json!({ "name": "Ada Lovelace" }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_batches_create_each_node_once() {
  let e = Arc::new(engine().await);
  let p = project(e.as_ref()).await;
  let names = ["Ada", "Charles", "Grace", "Alan", "Edsger"];

  let mut handles = Vec::new();
  for i in 0..8 {
    let e = e.clone();
    let chunk = Uuid::new_v4();
    let mut batch: Vec<Mention> = names.iter().map(|n| mention(chunk, "Person", n)).collect();
    batch.rotate_left(i % names.len());
    if i % 2 == 1 {
      batch.reverse();
    }
    handles.push(tokio::spawn(async move {
      e.build_graph(p, batch, &PipelineOptions::default()).await
    }));
  }

  let mut created = 0;
  for handle in handles {
    created += handle.await.unwrap().unwrap().nodes_created;
  }
  assert_eq!(created, names.len());
  assert_eq!(e.store().count_nodes(p).await.unwrap(), names.len() as u64);
  // 5 nodes fully connected.
  assert_eq!(e.store().count_edges(p).await.unwrap(), 10);
}

#[tokio::test]
async fn a_bad_relationship_type_fails_before_any_node_is_written() {
  let e = engine().await;
  let p = project(&e).await;
  let c = Uuid::new_v4();
  let options = PipelineOptions { relationship_type: " bad".into(), ..Default::default() };

  let err = e
    .build_graph(p, vec![mention(c, "Person", "Ada"), mention(c, "Person", "Bob")], &options)
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::InvalidSchemaName { .. }));
  assert_eq!(e.store().count_nodes(p).await.unwrap(), 0);
  assert!(e.list_schemas(p, false).await.unwrap().is_empty());
  assert_eq!(e.get_project(p).await.unwrap().usage(UsageCounter::Nodes), 0);
}

#[tokio::test]
async fn a_relationship_type_naming_a_node_schema_writes_nothing() {
  let e = engine().await;
  let p = project(&e).await;
  e.create_schema(p, person(), &BreakingPolicy::Supersede).await.unwrap();
  let c = Uuid::new_v4();
  let options = PipelineOptions { relationship_type: "Person".into(), ..Default::default() };

  let err = e
    .build_graph(p, vec![mention(c, "Person", "Ada"), mention(c, "Person", "Bob")], &options)
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), ontograph_core::Error::SchemaKindConflict { .. }));
  assert_eq!(e.store().count_nodes(p).await.unwrap(), 0);

  // Without a pair to connect, the relationship type is never touched.
  let report = e.build_graph(p, vec![mention(c, "Person", "Ada")], &options).await.unwrap();
  assert_eq!(report.nodes_created, 1);
}

/// A store whose node key lookups and inserts never see a row, as if a
/// competing writer kept winning and its rows stayed invisible.
struct LosingStore {
  inner: SqliteStore,
}

impl KnowledgeStore for LosingStore {
  type Error = ontograph_store_sqlite::Error;

  async fn create_project(&self, input: NewProject) -> Result<Project, Self::Error> {
    self.inner.create_project(input).await
  }

  async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, Self::Error> {
    self.inner.get_project(project_id).await
  }

  async fn list_projects(&self) -> Result<Vec<Project>, Self::Error> { self.inner.list_projects().await }

  async fn increment_usage(&self, project_id: Uuid, counter: UsageCounter, by: u64) -> Result<(), Self::Error> {
    self.inner.increment_usage(project_id, counter, by).await
  }

  async fn teardown_project(&self, project_id: Uuid) -> Result<bool, Self::Error> {
    self.inner.teardown_project(project_id).await
  }

  async fn add_document(&self, project_id: Uuid, filename: String) -> Result<Document, Self::Error> {
    self.inner.add_document(project_id, filename).await
  }

  async fn insert_chunks(&self, project_id: Uuid, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, Self::Error> {
    self.inner.insert_chunks(project_id, chunks).await
  }

  async fn list_chunks(&self, file_id: Uuid) -> Result<Vec<Chunk>, Self::Error> {
    self.inner.list_chunks(file_id).await
  }

  async fn set_chunk_embedding(&self, chunk_id: Uuid, embedding: Vec<f32>) -> Result<(), Self::Error> {
    self.inner.set_chunk_embedding(chunk_id, embedding).await
  }

  async fn insert_schema(&self, schema: Schema) -> Result<(Schema, UpsertOutcome), Self::Error> {
    self.inner.insert_schema(schema).await
  }

  async fn supersede_schema(&self, previous: Uuid, schema: Schema) -> Result<Schema, Self::Error> {
    self.inner.supersede_schema(previous, schema).await
  }

  async fn get_schema(&self, schema_id: Uuid) -> Result<Option<Schema>, Self::Error> {
    self.inner.get_schema(schema_id).await
  }

  async fn get_active_schema<'a>(
    &'a self,
    project_id: Uuid,
    schema_name: &'a str,
  ) -> Result<Option<Schema>, Self::Error> {
    self.inner.get_active_schema(project_id, schema_name).await
  }

  async fn list_schemas(&self, project_id: Uuid, active_only: bool) -> Result<Vec<Schema>, Self::Error> {
    self.inner.list_schemas(project_id, active_only).await
  }

  async fn schema_history<'a>(
    &'a self,
    project_id: Uuid,
    schema_name: &'a str,
  ) -> Result<Vec<Schema>, Self::Error> {
    self.inner.schema_history(project_id, schema_name).await
  }

  async fn insert_proposal(&self, proposal: Proposal) -> Result<Proposal, Self::Error> {
    self.inner.insert_proposal(proposal).await
  }

  async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, Self::Error> {
    self.inner.get_proposal(proposal_id).await
  }

  async fn save_proposal(&self, proposal: Proposal) -> Result<(), Self::Error> {
    self.inner.save_proposal(proposal).await
  }

  async fn insert_node_if_absent(&self, _node: NewNode) -> Result<Option<Node>, Self::Error> { Ok(None) }

  async fn find_node<'a>(
    &'a self,
    _project_id: Uuid,
    _schema_name: &'a str,
    _normalized_name: &'a str,
  ) -> Result<Option<Node>, Self::Error> {
    Ok(None)
  }

  async fn get_node(&self, node_id: Uuid) -> Result<Option<Node>, Self::Error> {
    self.inner.get_node(node_id).await
  }

  async fn list_nodes(&self, project_id: Uuid) -> Result<Vec<Node>, Self::Error> {
    self.inner.list_nodes(project_id).await
  }

  async fn count_nodes(&self, project_id: Uuid) -> Result<u64, Self::Error> {
    self.inner.count_nodes(project_id).await
  }

  async fn set_node_vector(&self, node_id: Uuid, vector: Vec<f32>) -> Result<(), Self::Error> {
    self.inner.set_node_vector(node_id, vector).await
  }

  async fn insert_edge_if_absent(&self, edge: NewEdge) -> Result<Option<Edge>, Self::Error> {
    self.inner.insert_edge_if_absent(edge).await
  }

  async fn find_edge(&self, project_id: Uuid, key: EdgeKey) -> Result<Option<Edge>, Self::Error> {
    self.inner.find_edge(project_id, key).await
  }

  async fn list_edges(&self, project_id: Uuid) -> Result<Vec<Edge>, Self::Error> {
    self.inner.list_edges(project_id).await
  }

  async fn count_edges(&self, project_id: Uuid) -> Result<u64, Self::Error> {
    self.inner.count_edges(project_id).await
  }
}

#[tokio::test]
async fn a_node_key_that_never_becomes_visible_is_a_race_error() {
  let inner = SqliteStore::open_in_memory().await.unwrap();
  let e = Engine::new(Arc::new(LosingStore { inner }), Arc::new(MemoryGraph::new()), EngineConfig::default());
  let p = e.create_project(NewProject::named("test")).await.unwrap().project_id;

  let err = e
    .build_graph(p, vec![mention(Uuid::new_v4(), "Person", "Ada")], &PipelineOptions::default())
    .await
    .unwrap_err();
  match err {
    Error::DuplicateKeyRace(key) => assert_eq!(key, "Person/ada"),
    other => panic!("expected a race error, got {other:?}"),
  }
  assert_eq!(e.get_project(p).await.unwrap().usage(UsageCounter::Nodes), 0);
}

// ─── Sync ────────────────────────────────────────────────────────────────────

async fn seeded<G: GraphStore>(e: &TestEngine<G>, p: Uuid, names: &[&str]) -> Vec<Uuid> {
  let chunk = Uuid::new_v4();
  let batch = names.iter().map(|n| mention(chunk, "Person", n)).collect();
  e.build_graph(p, batch, &PipelineOptions::default()).await.unwrap().node_ids
}

#[tokio::test]
async fn sync_is_idempotent() {
  let e = engine().await;
  let p = project(&e).await;
  seeded(&e, p, &["Ada", "Charles", "Grace"]).await;

  let first = e.sync(p).await.unwrap();
  assert_eq!(first.nodes_synced, 3);
  assert_eq!(first.relationships_synced, 3);
  assert_eq!(first.vertices_created, 3);
  assert!(!first.is_partial());

  let second = e.sync(p).await.unwrap();
  assert_eq!(second.nodes_synced, first.nodes_synced);
  assert_eq!(second.relationships_synced, first.relationships_synced);
  assert!(second.is_noop());

  assert_eq!(e.graph().count_vertices(p).await.unwrap(), 3);
  assert_eq!(e.graph().count_relationships(p).await.unwrap(), 3);
  assert_eq!(e.get_project(p).await.unwrap().usage(UsageCounter::Syncs), 2);

  let report = e.verify(p).await.unwrap();
  assert!(report.is_consistent(), "{report:?}");
  assert_eq!(report.sampled, 3);
}

#[tokio::test]
async fn a_second_sync_is_rejected_while_one_runs() {
  let e = engine().await;
  let p = project(&e).await;
  let lock = e.sync_lock(p);
  let guard = lock.lock().await;

  assert!(matches!(e.sync(p).await.unwrap_err(), Error::SyncInProgress(id) if id == p));
  drop(guard);
  assert!(e.sync(p).await.is_ok());
}

#[tokio::test]
async fn verify_reports_diverging_payloads() {
  let e = engine().await;
  let p = project(&e).await;
  let ids = seeded(&e, p, &["Ada", "Charles"]).await;
  e.sync(p).await.unwrap();

  let node = e.store().get_node(ids[0]).await.unwrap().unwrap();
  let mut tampered = VertexUpsert::from_node(&node);
  tampered.properties = json!({ "forged": true });
  assert_eq!(e.graph().merge_vertex(tampered).await.unwrap(), MergeOutcome::Updated);

  let report = e.verify(p).await.unwrap();
  assert!(!report.is_consistent());
  assert_eq!(report.relational_nodes, report.graph_vertices);
  assert_eq!(report.mismatches.len(), 1);
  let mismatch = &report.mismatches[0];
  assert_eq!(mismatch.node_id, ids[0]);
  assert_ne!(mismatch.graph_digest.as_deref(), Some(mismatch.relational_digest.as_str()));
}

/// A graph store that refuses to write one particular vertex.
#[derive(Default)]
struct FlakyGraph {
  inner:    MemoryGraph,
  poisoned: Mutex<Option<Uuid>>,
}

impl FlakyGraph {
  fn poison(&self, node_id: Uuid) { *self.poisoned.lock().unwrap() = Some(node_id); }

  fn is_poisoned(&self, node_id: Uuid) -> bool { *self.poisoned.lock().unwrap() == Some(node_id) }
}

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error("injected failure for vertex {0}")]
  Injected(Uuid),
  #[error(transparent)]
  Graph(#[from] ontograph_graph_mem::Error),
}

impl Transient for FlakyError {
  fn is_transient(&self) -> bool { false }
}

impl GraphStore for FlakyGraph {
  type Error = FlakyError;

  async fn merge_vertex(&self, vertex: VertexUpsert) -> Result<MergeOutcome, FlakyError> {
    if self.is_poisoned(vertex.node_id) {
      return Err(FlakyError::Injected(vertex.node_id));
    }
    Ok(self.inner.merge_vertex(vertex).await?)
  }

  async fn merge_relationship(&self, r: RelationshipUpsert) -> Result<MergeOutcome, FlakyError> {
    Ok(self.inner.merge_relationship(r).await?)
  }

  async fn count_vertices(&self, project_id: Uuid) -> Result<u64, FlakyError> {
    Ok(self.inner.count_vertices(project_id).await?)
  }

  async fn count_relationships(&self, project_id: Uuid) -> Result<u64, FlakyError> {
    Ok(self.inner.count_relationships(project_id).await?)
  }

  async fn vertex_properties(&self, node_id: Uuid) -> Result<Option<Value>, FlakyError> {
    Ok(self.inner.vertex_properties(node_id).await?)
  }

  async fn detach_delete_project(&self, project_id: Uuid) -> Result<u64, FlakyError> {
    Ok(self.inner.detach_delete_project(project_id).await?)
  }
}

#[tokio::test]
async fn one_failing_node_does_not_abort_the_sync() {
  let e = engine_with(FlakyGraph::default()).await;
  let p = project(&e).await;

  // Separate chunks, so no edges.
  let mut ids = Vec::new();
  for name in ["A", "B", "C", "D", "E"] {
    ids.extend(seeded(&e, p, &[name]).await);
  }
  e.graph().poison(ids[2]);

  let result = e.sync(p).await.unwrap();
  assert_eq!(result.nodes_attempted, 5);
  assert_eq!(result.nodes_synced, 4);
  assert_eq!(result.failures.len(), 1);
  assert_eq!(result.failures[0].id, ids[2]);
  assert_eq!(result.failures[0].item, SyncItem::Vertex);
  assert!(result.is_partial());
}

#[tokio::test]
async fn relationships_to_failed_vertices_are_reported() {
  let e = engine_with(FlakyGraph::default()).await;
  let p = project(&e).await;
  let ids = seeded(&e, p, &["Ada", "Charles", "Grace"]).await;
  e.graph().poison(ids[0]);

  let result = e.sync(p).await.unwrap();
  assert_eq!(result.nodes_synced, 2);
  assert_eq!(result.relationships_attempted, 3);
  assert_eq!(result.relationships_synced, 1);
  let missing = result.failures.iter().filter(|f| f.reason == "endpoint vertex missing").count();
  assert_eq!(missing, 2);

  // Once the vertex can be written, a rerun converges.
  e.graph().poison(Uuid::nil());
  let rerun = e.sync(p).await.unwrap();
  assert!(!rerun.is_partial());
  assert_eq!(rerun.vertices_created, 1);
  assert_eq!(rerun.relationships_created, 2);
  assert!(e.verify(p).await.unwrap().is_consistent());
}

#[tokio::test]
async fn teardown_clears_both_stores() {
  let e = engine().await;
  let p = project(&e).await;
  seeded(&e, p, &["Ada", "Charles"]).await;
  e.sync(p).await.unwrap();

  let report = e.teardown_project(p).await.unwrap();
  assert_eq!(report.vertices_removed, 2);
  assert_eq!(e.graph().count_vertices(p).await.unwrap(), 0);
  assert!(matches!(e.get_project(p).await.unwrap_err(), Error::ProjectNotFound(_)));
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

/// Finds a fixed list of names.
struct NameSpotter(&'static [&'static str]);

impl EntityExtractor for NameSpotter {
  type Error = Infallible;

  async fn extract<'a>(&'a self, text: &'a str) -> Result<Vec<ExtractedEntity>, Infallible> {
    Ok(
      self
        .0
        .iter()
        .filter(|name| text.contains(*name))
        .map(|name| ExtractedEntity {
          type_label:   "Person".into(),
          surface_text: (*name).into(),
          confidence:   1.0,
          span:         None,
        })
        .collect(),
    )
  }
}

/// Embeds text as `[len, 0, 0, ..]` of a fixed width.
struct FixedWidth(usize);

impl Embedder for FixedWidth {
  type Error = Infallible;

  async fn embed<'a>(&'a self, text: &'a str) -> Result<Vec<f32>, Infallible> {
    let mut v = vec![0.0; self.0];
    if let Some(first) = v.first_mut() {
      *first = text.len() as f32;
    }
    Ok(v)
  }
}

#[tokio::test]
async fn documents_are_chunked_extracted_and_embedded() {
  let e = engine().await;
  let p = project(&e).await;
  let text = "Ada met Charles in London. Later Grace wrote about Ada and Charles.";
  let report = e
    .ingest_document(
      p,
      "notes.txt".into(),
      text,
      &WindowChunker::new(30, 0),
      &NameSpotter(&["Ada", "Charles", "Grace"]),
      &PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert_eq!(report.chunks, 3);
  assert_eq!(report.pipeline.nodes_created, 3);
  assert!(report.pipeline.edges_created >= 2);
  let project = e.get_project(p).await.unwrap();
  assert_eq!(project.usage(UsageCounter::Documents), 1);
  assert_eq!(project.usage(UsageCounter::Chunks), 3);

  // Without a vector configuration nothing is embedded.
  let skipped = e.embed_nodes(p, &FixedWidth(3)).await.unwrap();
  assert_eq!((skipped.embedded, skipped.skipped), (0, 3));

  let vectors = VectorConfig { dimension: 3, precision: Default::default(), embedding_model: "test".into() };
  let definition = SchemaDefinition::node("Person").with_vector_config(vectors);
  let schema = e.create_schema(p, definition, &BreakingPolicy::Supersede).await.unwrap();
  // Existing nodes stay pinned to the schema they were created under.
  assert_eq!(e.embed_nodes(p, &FixedWidth(3)).await.unwrap().embedded, 0);

  let later = e
    .build_graph(p, vec![mention(Uuid::new_v4(), "Person", "Alan")], &PipelineOptions::default())
    .await
    .unwrap();
  let alan = later.node_ids[0];
  assert_eq!(e.store().get_node(alan).await.unwrap().unwrap().schema_id, schema.schema_id);

  let wrong = e.embed_nodes(p, &FixedWidth(4)).await.unwrap();
  assert_eq!(wrong.failures.len(), 1);
  assert_eq!(wrong.failures[0].id, alan);

  let right = e.embed_nodes(p, &FixedWidth(3)).await.unwrap();
  assert_eq!(right.embedded, 1);
  assert_eq!(e.store().get_node(alan).await.unwrap().unwrap().vector, Some(vec![4.0, 0.0, 0.0]));

  let chunks = e.embed_chunks(report.document.file_id, &FixedWidth(2)).await.unwrap();
  assert_eq!(chunks.embedded, 3);
  let again = e.embed_chunks(report.document.file_id, &FixedWidth(2)).await.unwrap();
  assert_eq!((again.embedded, again.skipped), (0, 3));
}
