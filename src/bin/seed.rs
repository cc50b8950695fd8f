//! Sample corpus loader.
//!
//! Seeds a handful of common OTC drugs and diseases so the service can
//! be exercised without a catalog sync. Pass `--vectors` to also build
//! dense embeddings (requires the embedding credential), and
//! `--graph` to mirror relationships into the graph store.
//!
//! ```text
//! cargo run --bin seed -- [--vectors] [--graph]
//! ```

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mediseek::config::Settings;
use mediseek::db::{repository, Database};
use mediseek::external::catalog::CatalogClient;
use mediseek::external::openai::OpenAiClient;
use mediseek::graph::neo4j::Neo4jGraph;
use mediseek::ingest::sync::SyncService;
use mediseek::models::{Disease, Drug};
use mediseek::search::bm25::Bm25Index;
use mediseek::search::dense::DenseIndex;
use mediseek::search::sparse::LexicalWeightEncoder;

fn sample_drugs() -> Vec<Drug> {
    let rows: Vec<(&str, &str, &str, &str, &str, &str)> = vec![
        (
            "SEED-001",
            "타이레놀정500밀리그람",
            "한국얀센",
            "감기로 인한 발열 및 동통(통증), 두통, 신경통, 근육통, 월경통, 염좌통",
            "만 12세 이상 소아 및 성인: 1회 1~2정씩 1일 3-4회 (4-6시간 마다) 필요시 복용",
            "매일 세잔 이상 정기적으로 술을 마시는 사람은 의사 또는 약사와 상의. 간손상 주의",
        ),
        (
            "SEED-002",
            "판콜에이내복액",
            "동화약품",
            "감기의 제증상(콧물, 코막힘, 재채기, 인후통, 기침, 가래, 오한, 발열, 두통, 관절통, 근육통)의 완화",
            "성인 1회 1병(30mL), 1일 3회 식후 30분에 복용",
            "복용 후 졸음이 올 수 있으므로 운전 시 주의",
        ),
        (
            "SEED-003",
            "베아제정",
            "대웅제약",
            "소화불량, 식욕감퇴, 과식, 체함, 소화촉진, 소화불량으로 인한 위부팽만감",
            "성인 1회 1정, 1일 3회 식후 복용",
            "만 7세 이하의 어린이는 복용하지 말 것",
        ),
        (
            "SEED-004",
            "게보린정",
            "삼진제약",
            "두통, 치통, 생리통, 신경통, 근육통 등의 진통과 오한, 발열 시의 해열",
            "성인 1회 1정, 1일 3회까지, 공복을 피해 복용",
            "15세 미만 소아는 복용하지 말 것. 아스피린 과민반응 환자 주의",
        ),
        (
            "SEED-005",
            "지르텍정",
            "한국유씨비제약",
            "알레르기 비염, 두드러기, 가려움증(소양증)의 완화",
            "성인 및 6세 이상 소아: 1일 1회 1정 취침 전 복용",
            "복용 후 졸음이 올 수 있음. 음주 시 복용하지 말 것",
        ),
        (
            "SEED-006",
            "스멕타현탁액",
            "대웅제약",
            "급성, 만성 설사 및 식도, 위, 십이지장 질환과 관련된 통증의 완화",
            "성인 1일 3회, 1회 1포 복용",
            "다른 약물과 함께 복용할 경우 시간 간격을 둘 것",
        ),
    ];

    rows.into_iter()
        .map(|(id, name, entp, efficacy, use_method, caution)| Drug {
            id: id.to_string(),
            item_name: name.to_string(),
            entp_name: Some(entp.to_string()),
            efficacy: Some(efficacy.to_string()),
            use_method: Some(use_method.to_string()),
            warning_info: None,
            caution_info: Some(caution.to_string()),
            interaction: None,
            side_effects: None,
            storage_method: Some("실온 보관, 어린이 손이 닿지 않는 곳".to_string()),
            data_source: "seed".to_string(),
        })
        .collect()
}

fn sample_diseases() -> Vec<Disease> {
    let rows: Vec<(&str, &str, &str, &str, &str, &str, &str)> = vec![
        (
            "DIS-001",
            "긴장성 두통",
            "Tension headache",
            "스트레스, 피로, 잘못된 자세, 장시간의 컴퓨터 작업",
            "머리 전체를 조이는 듯한 둔한 통증, 목과 어깨의 뻣뻣함",
            "휴식, 스트레칭, 진통제(아세트아미노펜) 복용",
            "규칙적인 수면, 스트레스 관리, 바른 자세 유지",
        ),
        (
            "DIS-002",
            "감기",
            "Common cold",
            "리노바이러스 등 호흡기 바이러스 감염",
            "콧물, 코막힘, 재채기, 인후통, 기침, 미열",
            "휴식과 수분 섭취, 증상 완화를 위한 종합감기약 복용",
            "손 씻기, 충분한 수면, 실내 습도 유지",
        ),
        (
            "DIS-003",
            "소화불량",
            "Dyspepsia",
            "과식, 빠른 식사, 기름진 음식, 스트레스",
            "상복부 팽만감, 조기 포만감, 속쓰림, 메스꺼움",
            "소화제 복용, 식습관 개선, 증상 지속 시 내시경 검사",
            "규칙적인 식사, 과식 피하기, 식후 가벼운 산책",
        ),
        (
            "DIS-004",
            "알레르기 비염",
            "Allergic rhinitis",
            "꽃가루, 집먼지진드기, 동물 털 등 알레르겐 노출",
            "맑은 콧물, 재채기, 코막힘, 코와 눈의 가려움",
            "항히스타민제 복용, 알레르겐 회피, 비강 세척",
            "실내 청결 유지, 꽃가루 시즌 외출 자제",
        ),
    ];

    rows.into_iter()
        .map(|(id, name, name_en, causes, symptoms, treatment, prevention)| Disease {
            id: id.to_string(),
            name: name.to_string(),
            name_en: Some(name_en.to_string()),
            category: None,
            description: None,
            causes: Some(causes.to_string()),
            symptoms: Some(symptoms.to_string()),
            diagnosis: None,
            treatment: Some(treatment.to_string()),
            prevention: Some(prevention.to_string()),
            related_drugs: None,
        })
        .collect()
}

/// (drug, symptom, effectiveness) triples mirrored into the graph.
const RELIEVES: &[(&str, &str, f64)] = &[
    ("SEED-001", "두통", 0.9),
    ("SEED-001", "발열", 0.85),
    ("SEED-004", "두통", 0.85),
    ("SEED-002", "콧물", 0.8),
    ("SEED-003", "소화불량", 0.85),
    ("SEED-005", "두드러기", 0.8),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let build_vectors = args.iter().any(|a| a == "--vectors");
    let seed_graph = args.iter().any(|a| a == "--graph");

    let settings = Settings::from_env()?;
    let db = Database::open(settings.database_path.clone())?;

    let conn = db.connect()?;
    let drugs = sample_drugs();
    for drug in &drugs {
        repository::upsert_drug(&conn, drug)?;
    }
    let diseases = sample_diseases();
    for disease in &diseases {
        repository::upsert_disease(&conn, disease)?;
    }
    drop(conn);
    tracing::info!(
        drugs = drugs.len(),
        diseases = diseases.len(),
        "sample corpus seeded"
    );

    if build_vectors {
        let openai = Arc::new(OpenAiClient::new(
            &settings.openai_base_url,
            &settings.openai_api_key,
            &settings.embedding_model,
            settings.embedding_dimensions,
            &settings.llm_model,
        ));
        let dense = DenseIndex::new(db.clone(), settings.embedding_dimensions);
        let bm25 = Arc::new(Bm25Index::new(db.clone()));
        let sync = SyncService::new(
            db.clone(),
            CatalogClient::new(&settings.catalog_base_url, &settings.catalog_api_key),
            openai,
            Arc::new(LexicalWeightEncoder::new(
                &settings.sparse_encoder_url,
                &settings.splade_model,
            )),
            dense,
            None,
            bm25,
        );

        let drug_vectors = sync.rebuild_vectors().await?;
        let disease_vectors = sync.rebuild_disease_vectors().await?;
        tracing::info!(drug_vectors, disease_vectors, "vectors built");
    }

    if seed_graph {
        let graph = Neo4jGraph::connect(
            &settings.neo4j_uri,
            &settings.neo4j_user,
            &settings.neo4j_password,
        )
        .await?;

        for drug in &drugs {
            graph
                .create_drug_node(
                    &drug.id,
                    &drug.item_name,
                    drug.entp_name.as_deref(),
                    drug.efficacy.as_deref(),
                )
                .await?;
        }
        for disease in &diseases {
            graph
                .create_disease_node(&disease.id, &disease.name, disease.category.as_deref())
                .await?;
        }
        for (drug_id, symptom, effectiveness) in RELIEVES {
            graph.create_relieves(drug_id, symptom, *effectiveness).await?;
        }

        // Representative clinical relationships among the seeds.
        graph
            .create_treats("SEED-001", "DIS-001", "primary", Some("해열진통제 1차 권고"))
            .await?;
        graph
            .create_treats("SEED-002", "DIS-002", "primary", Some("종합감기약"))
            .await?;
        graph
            .create_treats("SEED-003", "DIS-003", "primary", None)
            .await?;
        graph
            .create_treats("SEED-005", "DIS-004", "primary", None)
            .await?;
        graph
            .create_similar_to("SEED-001", "SEED-004", 0.85, "same_efficacy")
            .await?;
        graph
            .create_interaction(
                "SEED-001",
                "SEED-004",
                "caution",
                3,
                Some("해열진통제 중복 복용 주의"),
            )
            .await?;

        tracing::info!("graph relationships seeded");
    }

    Ok(())
}
