//! Neo4j-backed [`GraphSource`].
//!
//! Uniqueness constraints are asserted on connect: `Drug.id`,
//! `Disease.id`, `Symptom.name`. Write helpers exist for the seed
//! loader and the graph sync job; retrieval only reads.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use neo4rs::{query, Graph};

use super::{
    CrossInteraction, DiseaseDrug, DrugInteraction, GraphData, GraphEdge, GraphError, GraphNode,
    GraphSource, GraphStats, RelatedDrug, SymptomDrug,
};

const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT drug_id_unique IF NOT EXISTS FOR (d:Drug) REQUIRE d.id IS UNIQUE",
    "CREATE CONSTRAINT disease_id_unique IF NOT EXISTS FOR (d:Disease) REQUIRE d.id IS UNIQUE",
    "CREATE CONSTRAINT symptom_name_unique IF NOT EXISTS FOR (s:Symptom) REQUIRE s.name IS UNIQUE",
];

pub struct Neo4jGraph {
    graph: Graph,
}

impl Neo4jGraph {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, GraphError> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        for constraint in CONSTRAINTS {
            graph
                .run(query(constraint))
                .await
                .map_err(|e| GraphError::Query(e.to_string()))?;
        }

        tracing::info!(uri, "graph store connected");
        Ok(Self { graph })
    }

    // ── Writes (seed loader / sync job) ─────────────────────────

    pub async fn create_drug_node(
        &self,
        drug_id: &str,
        item_name: &str,
        entp_name: Option<&str>,
        efficacy: Option<&str>,
    ) -> Result<(), GraphError> {
        self.graph
            .run(
                query(
                    "MERGE (d:Drug {id: $drug_id})
                     SET d.item_name = $item_name,
                         d.entp_name = $entp_name,
                         d.efficacy = $efficacy,
                         d.updated_at = datetime()
                     ON CREATE SET d.created_at = datetime()",
                )
                .param("drug_id", drug_id)
                .param("item_name", item_name)
                .param("entp_name", entp_name.unwrap_or(""))
                .param("efficacy", efficacy.unwrap_or("")),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    pub async fn create_disease_node(
        &self,
        disease_id: &str,
        name: &str,
        category: Option<&str>,
    ) -> Result<(), GraphError> {
        self.graph
            .run(
                query(
                    "MERGE (d:Disease {id: $disease_id})
                     SET d.name = $name,
                         d.category = $category,
                         d.updated_at = datetime()
                     ON CREATE SET d.created_at = datetime()",
                )
                .param("disease_id", disease_id)
                .param("name", name)
                .param("category", category.unwrap_or("")),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    pub async fn create_interaction(
        &self,
        drug_id_1: &str,
        drug_id_2: &str,
        interaction_type: &str,
        severity: i64,
        description: Option<&str>,
    ) -> Result<(), GraphError> {
        self.graph
            .run(
                query(
                    "MATCH (d1:Drug {id: $drug_id_1})
                     MATCH (d2:Drug {id: $drug_id_2})
                     MERGE (d1)-[r:INTERACTS_WITH]->(d2)
                     SET r.interaction_type = $interaction_type,
                         r.severity = $severity,
                         r.description = $description,
                         r.updated_at = datetime()
                     ON CREATE SET r.created_at = datetime()",
                )
                .param("drug_id_1", drug_id_1)
                .param("drug_id_2", drug_id_2)
                .param("interaction_type", interaction_type)
                .param("severity", severity)
                .param("description", description.unwrap_or("")),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    pub async fn create_treats(
        &self,
        drug_id: &str,
        disease_id: &str,
        efficacy_level: &str,
        evidence: Option<&str>,
    ) -> Result<(), GraphError> {
        self.graph
            .run(
                query(
                    "MATCH (d:Drug {id: $drug_id})
                     MATCH (dis:Disease {id: $disease_id})
                     MERGE (d)-[r:TREATS]->(dis)
                     SET r.efficacy_level = $efficacy_level,
                         r.evidence = $evidence,
                         r.updated_at = datetime()
                     ON CREATE SET r.created_at = datetime()",
                )
                .param("drug_id", drug_id)
                .param("disease_id", disease_id)
                .param("efficacy_level", efficacy_level)
                .param("evidence", evidence.unwrap_or("")),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    pub async fn create_relieves(
        &self,
        drug_id: &str,
        symptom_name: &str,
        effectiveness: f64,
    ) -> Result<(), GraphError> {
        self.graph
            .run(
                query(
                    "MATCH (d:Drug {id: $drug_id})
                     MERGE (s:Symptom {name: $symptom_name})
                     ON CREATE SET s.normalized_name = toLower($symptom_name),
                                   s.created_at = datetime()
                     MERGE (d)-[r:RELIEVES]->(s)
                     SET r.effectiveness = $effectiveness,
                         r.updated_at = datetime()
                     ON CREATE SET r.created_at = datetime()",
                )
                .param("drug_id", drug_id)
                .param("symptom_name", symptom_name)
                .param("effectiveness", effectiveness),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    pub async fn create_similar_to(
        &self,
        drug_id_1: &str,
        drug_id_2: &str,
        similarity_score: f64,
        similarity_type: &str,
    ) -> Result<(), GraphError> {
        self.graph
            .run(
                query(
                    "MATCH (d1:Drug {id: $drug_id_1})
                     MATCH (d2:Drug {id: $drug_id_2})
                     MERGE (d1)-[r:SIMILAR_TO]->(d2)
                     SET r.similarity_score = $similarity_score,
                         r.similarity_type = $similarity_type,
                         r.updated_at = datetime()
                     ON CREATE SET r.created_at = datetime()",
                )
                .param("drug_id_1", drug_id_1)
                .param("drug_id_2", drug_id_2)
                .param("similarity_score", similarity_score)
                .param("similarity_type", similarity_type),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }
}

#[async_trait]
impl GraphSource for Neo4jGraph {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn drug_interactions(
        &self,
        drug_id: &str,
    ) -> Result<Vec<DrugInteraction>, GraphError> {
        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (d:Drug {id: $drug_id})-[r:INTERACTS_WITH]-(other:Drug)
                     RETURN other.id AS drug_id,
                            other.item_name AS item_name,
                            r.interaction_type AS interaction_type,
                            r.severity AS severity,
                            r.description AS description
                     ORDER BY r.severity DESC",
                )
                .param("drug_id", drug_id),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut interactions = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            interactions.push(DrugInteraction {
                drug_id: row.get("drug_id").unwrap_or_default(),
                item_name: row.get("item_name").unwrap_or_default(),
                interaction_type: row
                    .get("interaction_type")
                    .unwrap_or_else(|_| "unknown".to_string()),
                severity: row.get("severity").unwrap_or(1),
                description: row.get("description").unwrap_or_default(),
            });
        }
        Ok(interactions)
    }

    async fn related_drugs(
        &self,
        drug_id: &str,
        limit: usize,
    ) -> Result<Vec<RelatedDrug>, GraphError> {
        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (d:Drug {id: $drug_id})
                     OPTIONAL MATCH (d)-[r1:SIMILAR_TO]-(similar:Drug)
                     OPTIONAL MATCH (d)-[r2:INTERACTS_WITH]-(interacts:Drug)
                     WITH collect(DISTINCT {
                            drug_id: similar.id,
                            item_name: similar.item_name,
                            type: 'similar',
                            score: r1.similarity_score
                          }) AS similar_drugs,
                          collect(DISTINCT {
                            drug_id: interacts.id,
                            item_name: interacts.item_name,
                            type: 'interacts',
                            score: 1.0 - (r2.severity / 5.0)
                          }) AS interacting_drugs
                     UNWIND similar_drugs + interacting_drugs AS drug
                     WITH drug WHERE drug.drug_id IS NOT NULL
                     RETURN DISTINCT drug.drug_id AS drug_id,
                            drug.item_name AS item_name,
                            drug.type AS relationship_type,
                            drug.score AS score
                     ORDER BY drug.score DESC
                     LIMIT $limit",
                )
                .param("drug_id", drug_id)
                .param("limit", limit as i64),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut drugs = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            drugs.push(RelatedDrug {
                drug_id: row.get("drug_id").unwrap_or_default(),
                item_name: row.get("item_name").unwrap_or_default(),
                relationship_type: row
                    .get("relationship_type")
                    .unwrap_or_else(|_| "unknown".to_string()),
                score: row.get("score").unwrap_or(0.0),
            });
        }
        Ok(drugs)
    }

    async fn drugs_for_disease(
        &self,
        disease_id: &str,
        limit: usize,
    ) -> Result<Vec<DiseaseDrug>, GraphError> {
        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (d:Drug)-[r:TREATS]->(dis:Disease {id: $disease_id})
                     RETURN d.id AS drug_id,
                            d.item_name AS item_name,
                            d.entp_name AS entp_name,
                            r.efficacy_level AS efficacy_level,
                            r.evidence AS evidence
                     ORDER BY CASE r.efficacy_level
                         WHEN 'primary' THEN 1
                         WHEN 'secondary' THEN 2
                         ELSE 3 END
                     LIMIT $limit",
                )
                .param("disease_id", disease_id)
                .param("limit", limit as i64),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut drugs = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            drugs.push(DiseaseDrug {
                drug_id: row.get("drug_id").unwrap_or_default(),
                item_name: row.get("item_name").unwrap_or_default(),
                entp_name: row.get("entp_name").ok(),
                efficacy_level: row
                    .get("efficacy_level")
                    .unwrap_or_else(|_| "unknown".to_string()),
                evidence: row.get("evidence").ok(),
            });
        }
        Ok(drugs)
    }

    async fn drugs_for_symptom(
        &self,
        symptom: &str,
        limit: usize,
    ) -> Result<Vec<SymptomDrug>, GraphError> {
        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (d:Drug)-[r:RELIEVES]->(s:Symptom)
                     WHERE s.name = $symptom OR s.normalized_name = toLower($symptom)
                     RETURN d.id AS drug_id,
                            d.item_name AS item_name,
                            d.entp_name AS entp_name,
                            r.effectiveness AS effectiveness
                     ORDER BY r.effectiveness DESC
                     LIMIT $limit",
                )
                .param("symptom", symptom)
                .param("limit", limit as i64),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut drugs = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            drugs.push(SymptomDrug {
                drug_id: row.get("drug_id").unwrap_or_default(),
                item_name: row.get("item_name").unwrap_or_default(),
                entp_name: row.get("entp_name").ok(),
                effectiveness: row.get("effectiveness").unwrap_or(0.0),
            });
        }
        Ok(drugs)
    }

    async fn drug_graph(&self, drug_id: &str, depth: usize) -> Result<GraphData, GraphError> {
        let depth = depth.clamp(1, 3);
        // Variable-length bounds cannot be parameterized; depth is
        // clamped above before interpolation.
        let cypher = format!(
            "MATCH path = (d:Drug {{id: $drug_id}})-[*1..{depth}]-(connected)
             WHERE connected:Drug OR connected:Disease OR connected:Symptom
             UNWIND relationships(path) AS r
             WITH DISTINCT r
             MATCH (a)-[r]->(b)
             RETURN coalesce(a.id, a.name) AS source_id,
                    labels(a)[0] AS source_label,
                    coalesce(a.item_name, a.name, a.id) AS source_name,
                    coalesce(b.id, b.name) AS target_id,
                    labels(b)[0] AS target_label,
                    coalesce(b.item_name, b.name, b.id) AS target_name,
                    type(r) AS rel_type"
        );

        let mut stream = self
            .graph
            .execute(query(&cypher).param("drug_id", drug_id))
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut nodes: HashMap<String, GraphNode> = HashMap::new();
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut seen_edges: HashSet<String> = HashSet::new();

        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            let source_id: String = row.get("source_id").unwrap_or_default();
            let target_id: String = row.get("target_id").unwrap_or_default();
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            if source_id.is_empty() || target_id.is_empty() {
                continue;
            }

            nodes.entry(source_id.clone()).or_insert_with(|| GraphNode {
                id: source_id.clone(),
                label: row.get("source_label").unwrap_or_else(|_| "Unknown".to_string()),
                name: row.get("source_name").unwrap_or_default(),
            });
            nodes.entry(target_id.clone()).or_insert_with(|| GraphNode {
                id: target_id.clone(),
                label: row.get("target_label").unwrap_or_else(|_| "Unknown".to_string()),
                name: row.get("target_name").unwrap_or_default(),
            });

            let edge_key = format!("{source_id}-{rel_type}-{target_id}");
            if seen_edges.insert(edge_key) {
                edges.push(GraphEdge {
                    source: source_id,
                    target: target_id,
                    rel_type,
                });
            }
        }

        Ok(GraphData {
            nodes: nodes.into_values().collect(),
            edges,
        })
    }

    async fn cross_interactions(
        &self,
        drug_ids: &[String],
    ) -> Result<Vec<CrossInteraction>, GraphError> {
        if drug_ids.len() < 2 {
            return Ok(Vec::new());
        }

        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (d1:Drug)-[r:INTERACTS_WITH]-(d2:Drug)
                     WHERE d1.id IN $drug_ids AND d2.id IN $drug_ids AND d1.id < d2.id
                     RETURN d1.id AS drug_id_1,
                            d1.item_name AS item_name_1,
                            d2.id AS drug_id_2,
                            d2.item_name AS item_name_2,
                            r.interaction_type AS interaction_type,
                            r.severity AS severity,
                            r.description AS description
                     ORDER BY r.severity DESC",
                )
                .param("drug_ids", drug_ids.to_vec()),
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut interactions = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            interactions.push(CrossInteraction {
                drug_id_1: row.get("drug_id_1").unwrap_or_default(),
                item_name_1: row.get("item_name_1").unwrap_or_default(),
                drug_id_2: row.get("drug_id_2").unwrap_or_default(),
                item_name_2: row.get("item_name_2").unwrap_or_default(),
                interaction_type: row
                    .get("interaction_type")
                    .unwrap_or_else(|_| "unknown".to_string()),
                severity: row.get("severity").unwrap_or(1),
                description: row.get("description").unwrap_or_default(),
            });
        }
        Ok(interactions)
    }

    async fn stats(&self) -> Result<GraphStats, GraphError> {
        let mut stream = self
            .graph
            .execute(query(
                "MATCH (d:Drug) WITH count(d) AS drugs
                 MATCH (dis:Disease) WITH drugs, count(dis) AS diseases
                 MATCH (s:Symptom) WITH drugs, diseases, count(s) AS symptoms
                 MATCH ()-[r]->() RETURN drugs, diseases, symptoms, count(r) AS relationships",
            ))
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        if let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            return Ok(GraphStats {
                drugs: row.get("drugs").unwrap_or(0),
                diseases: row.get("diseases").unwrap_or(0),
                symptoms: row.get("symptoms").unwrap_or(0),
                relationships: row.get("relationships").unwrap_or(0),
            });
        }
        Ok(GraphStats::default())
    }
}
