//! Project (CUP) dataset columns.

use super::{ColumnCatalog, Dataset, NumericKind};

pub static PROJECTS: ColumnCatalog = ColumnCatalog {
    dataset: Dataset::Projects,
    table: "progetti",
    key: "CUP",
    cost_column: "COSTO_PROGETTO",
    all: ALL_COLUMNS,
    default_columns: DEFAULT_COLUMNS,
    filter_columns: FILTER_COLUMNS,
    search_columns: SEARCH_COLUMNS,
    numeric_columns: NUMERIC_COLUMNS,
};

const DEFAULT_COLUMNS: &[&str] = &[
    "CUP",
    "DESCRIZIONE_SINTETICA_CUP",
    "ANNO_DECISIONE",
    "STATO_PROGETTO",
    "COSTO_PROGETTO",
    "FINANZIAMENTO_PROGETTO",
    "SOGGETTO_TITOLARE",
    "NATURA_INTERVENTO",
    "SETTORE_INTERVENTO",
    "AREA_INTERVENTO",
    "REGIONE",
    "PROVINCIA",
    "COMUNE",
];

const FILTER_COLUMNS: &[&str] = &[
    "STATO_PROGETTO",
    "ANNO_DECISIONE",
    "SETTORE_INTERVENTO",
    "NATURA_INTERVENTO",
    "AREA_INTERVENTO",
    "CATEGORIA_INTERVENTO",
    "SOTTOSETTORE_INTERVENTO",
    "TIPOLOGIA_INTERVENTO",
    "STRUMENTO_PROGRAMMAZIONE",
    "TIPOLOGIA_CUP",
    "NATURA_DIPE",
    "AREA_GEOGRAFICA",
    "REGIONE",
    "PROVINCIA",
    "COMUNE",
    "CATEGORIA_SOGGETTO",
    "SOTTOCATEGORIA_SOGGETTO",
];

const SEARCH_COLUMNS: &[&str] = &[
    "CUP",
    "DESCRIZIONE_SINTETICA_CUP",
    "SOGGETTO_TITOLARE",
    "DENOMINAZIONE_BENEFICIARIO",
];

const NUMERIC_COLUMNS: &[(&str, NumericKind)] = &[
    ("ANNO_DECISIONE", NumericKind::Integer),
    ("COSTO_PROGETTO", NumericKind::Decimal),
    ("FINANZIAMENTO_PROGETTO", NumericKind::Decimal),
    ("ANNO_DELIBERA", NumericKind::Integer),
];

/// Columns joined in from the location reference table.
pub const LOCATION_COLUMNS: &[&str] = &[
    "AREA_GEOGRAFICA",
    "REGIONE",
    "SIGLA_PROVINCIA",
    "PROVINCIA",
    "COMUNE",
];

/// Columns joined in from the subject classification table.
pub const SUBJECT_COLUMNS: &[&str] = &["CATEGORIA_SOGGETTO", "SOTTOCATEGORIA_SOGGETTO"];

const ALL_COLUMNS: &[&str] = &[
    "CUP",
    "DESCRIZIONE_SINTETICA_CUP",
    "ANNO_DECISIONE",
    "STATO_PROGETTO",
    "COSTO_PROGETTO",
    "FINANZIAMENTO_PROGETTO",
    "SOGGETTO_TITOLARE",
    "PIVA_CODFISCALE_SOG_TITOLARE",
    "CODICE_NATURA_INTERVENTO",
    "NATURA_INTERVENTO",
    "COD_NATURA_DIPE",
    "NATURA_DIPE",
    "CODICE_TIPO_INTERVENTO",
    "TIPOLOGIA_INTERVENTO",
    "CODICE_AREA_INTERVENTO",
    "AREA_INTERVENTO",
    "CODICE_SETTORE_INTERVENTO",
    "SETTORE_INTERVENTO",
    "CODICE_SOTTOSETTORE_INTERVENTO",
    "SOTTOSETTORE_INTERVENTO",
    "CODICE_CATEGORIA_INTERVENTO",
    "CATEGORIA_INTERVENTO",
    "TIPOLOGIA_CUP",
    "DESCRIZIONE_INTERVENTO",
    "DENO_IMPRESA_STABILIMENTO",
    "PIVA_CF_BENEFICIARIO",
    "DENO_IMPRESA_STABILIMENTO_PREC",
    "DENOMINAZIONE_BENEFICIARIO",
    "STRUTTURA_INFRASTRUTTURA",
    "INDIRIZZO_INTERVENTO",
    "NUMERO_DELIBERA_CIPE",
    "ANNO_DELIBERA",
    "FLAG_LEGGE_OBIETTIVO",
    "FLAG_TIPO_GENERICO",
    "CUP_IN_RELAZIONE",
    "RUOLO_IN_RELAZIONE",
    "DESC_TIPO_RELAZIONE",
    "DATA_ULTIMA_MODIFICA_SSC",
    "DATA_ULTIMA_MODIFICA_UTENTE",
    "DATA_CHIUSURA_REVOCA",
    "CODICE_LOCALE_PROGETTO",
    "CODICE_STRUMENTO_PROGRAM",
    "STRUMENTO_PROGRAMMAZIONE",
    "FINANZA_PROGETTO",
    "SPONSORIZZAZIONI",
    "ALTRE_INFORMAZIONI",
    "DATA_GENERAZIONE_CUP",
    "CONTROLLO_QUALITA",
    "CUP_MASTER",
    "RAGIONI_COLLEGAMENTO",
    "COD_SEZIONE_ATECO",
    "SEZIONE_ATECO",
    "COD_DIVISIONE_ATECO",
    "DIVISIONE_ATECO",
    "COD_GRUPPO_ATECO",
    "GRUPPO_ATECO",
    "COD_CLASSE_ATECO",
    "CLASSE_ATECO",
    "COD_CATEGORIA_ATECO",
    "CATEGORIA_ATECO",
    "COD_SOTTOCATEG_ATECO",
    "SOTTOCATEGORIA_ATECO",
    "AREA_GEOGRAFICA",
    "REGIONE",
    "SIGLA_PROVINCIA",
    "PROVINCIA",
    "COMUNE",
    "CATEGORIA_SOGGETTO",
    "SOTTOCATEGORIA_SOGGETTO",
];
