// src/seed.rs
//! Built-in roster and activity vocabulary, used when neither the remote
//! endpoint nor the local cache has data.

use crate::model::{ActivityType, Person, UserRole};
use crate::schedule::{format_minutes, required_minutes, WeeklySchedule};

const ACTIVITY_NAMES: [&str; 16] = [
    "REPASSES GERAIS DO SUPERVISOR",
    "ORIENTAÇÕES SOBRE AS TURMAS COM O SUPERVISOR",
    "LANÇAMENTOS E REGISTROS NO DED",
    "ORGANIZAÇÃO DAS ATIVIDADES APLICADAS",
    "ATUALIZAÇÃO DO DED E REGISTROS DE FREQUÊNCIA",
    "AVALIAÇÃO DIAGNÓSTICA",
    "PREENCHIMENTO PLANILHA DE CONTROLE TRIMESTRAL",
    "REUNIÃO ADM/PEDAGÓGICA",
    "CONSELHO DE CLASSE",
    "PLANEJAMENTO TRIMESTRAL",
    "LANÇAMENTO RESULTADOS SIMAVE",
    "CORREÇÃO DE AVALIAÇÃO",
    "PRODUÇÃO DE AVALIAÇÃO",
    "LANÇAMENTO SIMADE",
    "REGISTRO DE ATA",
    "ORGANIZAÇÃO DIDÁTICA DE CONCEITOS",
];

fn teacher(
    id: &str,
    name: &str,
    masp: &str,
    subject: &str,
    workload: u32,
    schedule: WeeklySchedule,
) -> Person {
    Person {
        id: id.to_string(),
        name: name.to_string(),
        masp: masp.to_string(),
        role: UserRole::Teacher,
        subject: Some(subject.to_string()),
        ch_regime_basico: Some(workload),
        ch_extra_classe: Some(format_minutes(required_minutes(workload))),
        schedule: Some(schedule),
    }
}

fn thursday_morning() -> WeeklySchedule {
    WeeklySchedule {
        quinta: "07:00 às 12:00".to_string(),
        ..Default::default()
    }
}

pub fn teachers() -> Vec<Person> {
    vec![
        teacher(
            "1",
            "RENATO PEREIRA SILVA",
            "1324749-9",
            "QUÍMICA",
            22,
            WeeklySchedule {
                segunda: "16:00 às 17:00".to_string(),
                terca: "15:00 às 18:00".to_string(),
                quarta: "16:00 às 17:00".to_string(),
                quinta: "17:00 às 18:00".to_string(),
                sexta: "18:00 às 19:00".to_string(),
            },
        ),
        teacher("2", "MARIO COSTA", "1223895-2", "MATEMÁTICA", 20, thursday_morning()),
        teacher("3", "SARA DE SOUZA", "554545-5", "HISTÓRIA", 16, thursday_morning()),
    ]
}

pub fn activity_types() -> Vec<ActivityType> {
    ACTIVITY_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| ActivityType {
            id: (i + 1).to_string(),
            name: name.to_string(),
        })
        .collect()
}
