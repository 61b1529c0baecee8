//! Declared logical tables, one per record family

use super::mapping::ColumnMapping;
use super::types::{FieldSpec, ForeignKey, KeyPolicy, LogicalTable};
use std::sync::OnceLock;

pub const AIH_REDUZIDA: &str = "aih_reduzida";
pub const SERVICOS_PROFISSIONAIS: &str = "servicos_profissionais";
pub const AIH_REJEITADA: &str = "aih_rejeitada";
pub const CNES: &str = "cnes";
pub const ESTABELECIMENTOS_MES: &str = "estabelecimentos_mes";
pub const EQUIPAMENTOS_MES: &str = "equipamentos_mes";
pub const LEITOS_MES: &str = "leitos_mes";
pub const PROFISSIONAIS_MES: &str = "profissionais_mes";
pub const SERVICOS_ESPECIALIZADOS_MES: &str = "servicos_especializados_mes";
pub const EQUIPES_MES: &str = "equipes_mes";
pub const SIM: &str = "sim";

/// Key column of every table whose key is synthesized at ingestion
pub const SYNTHETIC_KEY: &str = "CHAVE_CONTADOR_FONTE";

/// Provenance column of admission and establishment tables
pub const FONTE: &str = "FONTE";

/// Provenance column of mortality records
pub const FONTE_DADOS: &str = "FONTE_DADOS";

/// Every declared table, in warehouse order
pub fn all() -> Vec<&'static LogicalTable> {
    vec![
        admissions(),
        service_lines(),
        rejected_admissions(),
        establishments(),
        establishment_months(),
        equipment_months(),
        bed_months(),
        professional_months(),
        specialized_service_months(),
        care_team_months(),
        mortality(),
    ]
}

pub fn by_name(name: &str) -> Option<&'static LogicalTable> {
    all().into_iter().find(|t| t.name == name)
}

fn synthetic_key() -> FieldSpec {
    FieldSpec::text(SYNTHETIC_KEY).required()
}

fn references(column: &'static str, table: &'static str, target: &'static str) -> ForeignKey {
    ForeignKey { column, references_table: table, references_column: target }
}

/// Hospital admission summaries (AIH reduzida)
pub fn admissions() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| LogicalTable {
        name: AIH_REDUZIDA,
        fields: vec![
            FieldSpec::string("N_AIH", 13).required(),
            FieldSpec::string("UF_ZI", 6),
            FieldSpec::string("ANO_CMPT", 4),
            FieldSpec::string("MES_CMPT", 2),
            FieldSpec::string("ESPEC", 2),
            FieldSpec::string("IDENT", 1),
            FieldSpec::string("MUNIC_RES", 6),
            FieldSpec::datetime("NASC"),
            FieldSpec::string("SEXO", 1),
            FieldSpec::integer("UTI_MES_TO"),
            FieldSpec::string("MARCA_UTI", 2),
            FieldSpec::integer("UTI_INT_TO"),
            FieldSpec::integer("DIAR_ACOM"),
            FieldSpec::integer("QT_DIARIAS"),
            FieldSpec::string("PROC_SOLIC", 10),
            FieldSpec::string("PROC_REA", 10),
            FieldSpec::decimal("VAL_SH", 13, 2),
            FieldSpec::decimal("VAL_SP", 13, 2),
            FieldSpec::decimal("VAL_TOT", 14, 2),
            FieldSpec::decimal("VAL_UTI", 8, 2),
            FieldSpec::decimal("US_TOT", 10, 2),
            FieldSpec::datetime("DT_INTER"),
            FieldSpec::datetime("DT_SAIDA"),
            FieldSpec::string("DIAG_PRINC", 4),
            FieldSpec::string("DIAG_SECUN", 4),
            FieldSpec::string("COBRANCA", 2),
            FieldSpec::string("NATUREZA", 2),
            FieldSpec::string("MUNIC_MOV", 6),
            FieldSpec::string("COD_IDADE", 1),
            FieldSpec::integer("IDADE"),
            FieldSpec::integer("MORTE"),
            FieldSpec::string("NACIONAL", 2),
            FieldSpec::string("CAR_INT", 2),
            FieldSpec::string("GESTOR_COD", 3),
            FieldSpec::string("GESTOR_TP", 1),
            FieldSpec::string("CNES", 7),
            FieldSpec::string("CID_MORTE", 4),
            FieldSpec::string("COMPLEX", 2),
            FieldSpec::string("FINANC", 2),
            FieldSpec::text(FONTE),
        ],
        primary_key: "N_AIH",
        foreign_keys: Vec::new(),
        provenance: FONTE,
        key_policy: KeyPolicy::Natural,
        mapping: ColumnMapping::identity(),
    })
}

/// Professional service line items attached to an admission
pub fn service_lines() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| LogicalTable {
        name: SERVICOS_PROFISSIONAIS,
        fields: vec![
            synthetic_key(),
            FieldSpec::string("SP_NAIH", 13),
            FieldSpec::string("SP_GESTOR", 6),
            FieldSpec::string("SP_AA", 4),
            FieldSpec::string("SP_MM", 2),
            FieldSpec::string("SP_CNES", 7),
            FieldSpec::string("SP_PROCREA", 10),
            FieldSpec::string("SP_ATOPROF", 10),
            FieldSpec::integer("SP_QTD_ATO"),
            FieldSpec::integer("SP_PTSP"),
            FieldSpec::decimal("SP_VALATO", 14, 2),
            FieldSpec::string("SP_M_HOSP", 6),
            FieldSpec::string("SP_M_PAC", 6),
            FieldSpec::string("SP_COMPLEX", 2),
            FieldSpec::string("SP_FINANC", 2),
            FieldSpec::string("SP_PF_CBO", 6),
            FieldSpec::string("SP_CIDPRI", 4),
            FieldSpec::integer("SP_QT_PROC"),
            FieldSpec::string("SP_U_AIH", 1),
            FieldSpec::text(FONTE),
        ],
        primary_key: SYNTHETIC_KEY,
        foreign_keys: vec![references("SP_NAIH", AIH_REDUZIDA, "N_AIH")],
        provenance: FONTE,
        key_policy: KeyPolicy::CounterWithProvenance { counter_column: None },
        mapping: ColumnMapping::identity(),
    })
}

/// Rejected admission claims
pub fn rejected_admissions() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| LogicalTable {
        name: AIH_REJEITADA,
        fields: vec![
            synthetic_key(),
            FieldSpec::string("N_AIH", 13),
            FieldSpec::string("UF_ZI", 6),
            FieldSpec::string("ANO_CMPT", 4),
            FieldSpec::string("MES_CMPT", 2),
            FieldSpec::string("MUNIC_RES", 6),
            FieldSpec::datetime("NASC"),
            FieldSpec::string("SEXO", 1),
            FieldSpec::integer("UTI_MES_TO"),
            FieldSpec::string("MARCA_UTI", 2),
            FieldSpec::integer("UTI_INT_TO"),
            FieldSpec::string("PROC_SOLIC", 10),
            FieldSpec::string("PROC_REA", 10),
            FieldSpec::decimal("VAL_SH", 13, 2),
            FieldSpec::decimal("VAL_SP", 13, 2),
            FieldSpec::decimal("VAL_TOT", 14, 2),
            FieldSpec::decimal("VAL_UTI", 8, 2),
            FieldSpec::decimal("US_TOT", 10, 2),
            FieldSpec::datetime("DT_INTER"),
            FieldSpec::datetime("DT_SAIDA"),
            FieldSpec::string("DIAG_PRINC", 4),
            FieldSpec::string("DIAG_SECUN", 4),
            FieldSpec::string("COBRANCA", 2),
            FieldSpec::string("NATUREZA", 2),
            FieldSpec::string("MUNIC_MOV", 6),
            FieldSpec::string("COD_IDADE", 1),
            FieldSpec::integer("IDADE"),
            FieldSpec::integer("MORTE"),
            FieldSpec::string("NACIONAL", 2),
            FieldSpec::string("CAR_INT", 2),
            FieldSpec::string("GESTOR_COD", 3),
            FieldSpec::string("GESTOR_TP", 1),
            FieldSpec::string("CNES", 7),
            FieldSpec::string("RACA_COR", 4),
            FieldSpec::string("ST_SITUAC", 1),
            FieldSpec::string("ST_BLOQ", 1),
            FieldSpec::string("ST_MOT_BLO", 2),
            FieldSpec::text(FONTE),
        ],
        primary_key: SYNTHETIC_KEY,
        foreign_keys: vec![references("N_AIH", AIH_REDUZIDA, "N_AIH")],
        provenance: FONTE,
        key_policy: KeyPolicy::CounterWithProvenance { counter_column: None },
        mapping: ColumnMapping::identity(),
    })
}

/// Establishment registry, one row per facility
pub fn establishments() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| LogicalTable {
        name: CNES,
        fields: vec![
            FieldSpec::string("CNES", 7).required(),
            FieldSpec::string("CODUFMUN", 7),
            FieldSpec::string("COD_CEP", 8),
            FieldSpec::string("CPF_CNPJ", 14),
            FieldSpec::string("PF_PJ", 1),
            FieldSpec::string("VINC_SUS", 1),
            FieldSpec::string("TPGESTAO", 1),
            FieldSpec::string("ESFERA_A", 2),
            FieldSpec::string("NATUREZA", 2),
            FieldSpec::string("TP_UNID", 2),
            FieldSpec::string("NIV_HIER", 2),
            FieldSpec::string("TP_PREST", 2),
            FieldSpec::decimal("LATITUDE", 11, 8),
            FieldSpec::decimal("LONGITUDE", 11, 8),
            FieldSpec::text(FONTE),
        ],
        primary_key: "CNES",
        foreign_keys: Vec::new(),
        provenance: FONTE,
        key_policy: KeyPolicy::Natural,
        mapping: ColumnMapping::identity(),
    })
}

/// Shared layout of the monthly establishment tables: synthetic key,
/// facility reference, competence month, then the family's own columns.
fn monthly(name: &'static str, specific: Vec<FieldSpec>) -> LogicalTable {
    let mut fields = vec![
        synthetic_key(),
        FieldSpec::string("CNES", 7),
        FieldSpec::datetime("COMPET").required(),
    ];
    fields.extend(specific);
    fields.push(FieldSpec::text(FONTE));
    LogicalTable {
        name,
        fields,
        primary_key: SYNTHETIC_KEY,
        foreign_keys: vec![references("CNES", CNES, "CNES")],
        provenance: FONTE,
        key_policy: KeyPolicy::CounterWithProvenance { counter_column: None },
        // The competence month arrives as a YYYYMM string named COMPETEN
        mapping: ColumnMapping::identity().with_rename("COMPETEN", "COMPET"),
    }
}

pub fn establishment_months() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        monthly(
            ESTABELECIMENTOS_MES,
            vec![
                FieldSpec::string("VINC_SUS", 1),
                FieldSpec::string("TPGESTAO", 1),
                FieldSpec::string("ESFERA_A", 2),
                FieldSpec::string("NATUREZA", 2),
                FieldSpec::string("TP_UNID", 2),
                FieldSpec::string("NIV_HIER", 2),
                FieldSpec::string("TP_PREST", 2),
                FieldSpec::integer("QTLEITP1"),
                FieldSpec::integer("QTLEITP2"),
                FieldSpec::integer("QTLEITP3"),
                FieldSpec::string("LEITHOSP", 1),
                FieldSpec::string("MOTDESAB", 2),
            ],
        )
    })
}

pub fn equipment_months() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        monthly(
            EQUIPAMENTOS_MES,
            vec![
                FieldSpec::string("TIPEQUIP", 1),
                FieldSpec::string("CODEQUIP", 2),
                FieldSpec::integer("QT_EXIST"),
                FieldSpec::integer("QT_USO"),
                FieldSpec::string("IND_SUS", 1),
                FieldSpec::string("IND_NSUS", 1),
            ],
        )
    })
}

pub fn bed_months() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        monthly(
            LEITOS_MES,
            vec![
                FieldSpec::string("TP_LEITO", 2),
                FieldSpec::string("CODLEITO", 2),
                FieldSpec::integer("QT_EXIST"),
                FieldSpec::integer("QT_CONTR"),
                FieldSpec::integer("QT_SUS"),
            ],
        )
    })
}

pub fn professional_months() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        monthly(
            PROFISSIONAIS_MES,
            vec![
                FieldSpec::string("CBO", 6),
                FieldSpec::string("CBO_UNICO", 2),
                FieldSpec::string("CNS_PROF", 15),
                FieldSpec::string("CONSELHO", 2),
                FieldSpec::string("REGISTRO", 13),
                FieldSpec::string("VINCULAC", 6),
                FieldSpec::string("VINCUL_C", 1),
                FieldSpec::string("VINCUL_A", 1),
                FieldSpec::string("VINCUL_N", 1),
                FieldSpec::string("PROF_SUS", 1),
                FieldSpec::string("PROFNSUS", 1),
                FieldSpec::string("HORAHOSP", 3),
                FieldSpec::string("HORA_AMB", 3),
            ],
        )
    })
}

pub fn specialized_service_months() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        monthly(
            SERVICOS_ESPECIALIZADOS_MES,
            vec![
                FieldSpec::string("SERV_ESP", 3),
                FieldSpec::string("CLASS_SR", 3),
                FieldSpec::string("SRVUNICO", 3),
                FieldSpec::string("CARACTER", 1),
                FieldSpec::string("AMB_HOSP", 4),
                FieldSpec::string("CONTSRVU", 1),
                FieldSpec::string("CNESTERC", 7),
            ],
        )
    })
}

/// One-character program flags carried by the care-team registry
const CARE_TEAM_FLAGS: &[&str] = &[
    "GESPRG1E", "GESPRG1M", "GESPRG2E", "GESPRG2M", "GESPRG4E", "GESPRG4M", "NIVATE_A",
    "GESPRG3E", "GESPRG3M", "GESPRG5E", "GESPRG5M", "GESPRG6E", "GESPRG6M", "NIVATE_H",
    "AP01CV01", "AP01CV02", "AP01CV05", "AP01CV06", "AP01CV03", "AP01CV04",
    "AP02CV01", "AP02CV02", "AP02CV05", "AP02CV06", "AP02CV03", "AP02CV04",
    "AP03CV01", "AP03CV02", "AP03CV05", "AP03CV06", "AP03CV03", "AP03CV04",
    "AP04CV01", "AP04CV02", "AP04CV05", "AP04CV06", "AP04CV03", "AP04CV04",
    "AP05CV01", "AP05CV02", "AP05CV05", "AP05CV06", "AP05CV03", "AP05CV04",
    "AP06CV01", "AP06CV02", "AP06CV05", "AP06CV06", "AP06CV03", "AP06CV04",
    "AP07CV01", "AP07CV02", "AP07CV05", "AP07CV06", "AP07CV03", "AP07CV04",
    "ATEND_PR",
];

pub fn care_team_months() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut specific: Vec<FieldSpec> =
            CARE_TEAM_FLAGS.iter().map(|&name| FieldSpec::string(name, 1)).collect();
        specific.extend([
            FieldSpec::string("ID_EQUIPE", 18),
            FieldSpec::string("TIPO_EQP", 2),
            FieldSpec::string("AREA_EQP", 10),
            FieldSpec::string("ID_SEGM", 8),
            FieldSpec::string("TIPOSEGM", 1),
        ]);
        monthly(EQUIPES_MES, specific)
    })
}

/// Death certificates
pub fn mortality() -> &'static LogicalTable {
    static TABLE: OnceLock<LogicalTable> = OnceLock::new();
    TABLE.get_or_init(|| LogicalTable {
        name: SIM,
        fields: vec![
            synthetic_key(),
            FieldSpec::string("TIPOBITO", 1),
            FieldSpec::datetime("DTOBITO").required(),
            FieldSpec::string("NATURAL", 3),
            FieldSpec::datetime("DTNASC"),
            FieldSpec::string("IDADE", 3),
            FieldSpec::string("SEXO", 1),
            FieldSpec::string("RACACOR", 1),
            FieldSpec::string("ESTCIV", 1),
            FieldSpec::string("ESC", 1),
            FieldSpec::string("OCUP", 6),
            FieldSpec::string("CODMUNRES", 7),
            FieldSpec::string("LOCOCOR", 1),
            FieldSpec::string("CODMUNOCOR", 8),
            FieldSpec::string("IDADEMAE", 2),
            FieldSpec::string("ESCMAE", 1),
            FieldSpec::string("OCUPMAE", 6),
            FieldSpec::string("QTDFILVIVO", 2),
            FieldSpec::string("QTDFILMORT", 2),
            FieldSpec::string("GRAVIDEZ", 1),
            FieldSpec::string("GESTACAO", 1),
            FieldSpec::string("PARTO", 1),
            FieldSpec::string("OBITOPARTO", 1),
            FieldSpec::string("PESO", 4),
            FieldSpec::string("OBITOGRAV", 1),
            FieldSpec::string("OBITOPUERP", 1),
            FieldSpec::string("ASSISTMED", 1),
            FieldSpec::string("EXAME", 1),
            FieldSpec::string("CIRURGIA", 1),
            FieldSpec::string("NECROPSIA", 1),
            FieldSpec::string("CAUSABAS", 4),
            FieldSpec::string("LINHAA", 20),
            FieldSpec::string("LINHAB", 20),
            FieldSpec::string("LINHAC", 20),
            FieldSpec::string("LINHAD", 20),
            FieldSpec::string("LINHAII", 30),
            FieldSpec::string("CIRCOBITO", 1),
            FieldSpec::string("ACIDTRAB", 1),
            FieldSpec::string(FONTE_DADOS, 8),
        ],
        primary_key: SYNTHETIC_KEY,
        foreign_keys: Vec::new(),
        provenance: FONTE_DADOS,
        key_policy: KeyPolicy::CounterWithProvenance { counter_column: Some("CONTADOR") },
        mapping: ColumnMapping::identity().with_rename("contador", "CONTADOR"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_declared_table_validates() {
        for table in all() {
            assert_eq!(table.validate(), Ok(()), "table {}", table.name);
        }
    }

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<_> = all().iter().map(|t| t.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), all().len());
    }

    #[test]
    fn foreign_keys_point_at_declared_primary_keys() {
        for table in all() {
            for fk in &table.foreign_keys {
                let target = by_name(fk.references_table).expect("referenced table");
                assert_eq!(target.primary_key, fk.references_column);
            }
        }
    }

    #[test]
    fn monthly_tables_rename_competence() {
        let table = equipment_months();
        assert_eq!(table.mapping.canonical("COMPETEN"), "COMPET");
        assert!(table.is_generated(SYNTHETIC_KEY));
        assert!(table.is_generated(FONTE));
        assert!(!table.is_generated("CNES"));
    }

    #[test]
    fn mortality_tags_fonte_dados() {
        assert_eq!(mortality().provenance, FONTE_DADOS);
        assert!(mortality().field(FONTE).is_none());
        assert_eq!(care_team_months().fields.len(), 3 + CARE_TEAM_FLAGS.len() + 5 + 1);
    }
}
