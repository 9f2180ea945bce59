mod common;

use calcsql::{
    micro_calc_to_sql, CalcError, FilterColumn, FilterIdColumn, FilterOp, MicroTranslator,
    OrderByColumn, ReadLayout, TranslateOptions,
};
use common::{calc, model, translate, FROM_ID};

fn read() -> ReadLayout {
    ReadLayout {
        from_id: FROM_ID,
        ..Default::default()
    }
}

/// Count non-overlapping occurrences
fn count(sql: &str, pattern: &str) -> usize {
    sql.matches(pattern).count()
}

#[test]
fn test_single_run_average() {
    let model = model();
    let sql = translate(&model, &read(), "OM_AVG(Income)", &[], &[219]).unwrap();

    assert_eq!(count(&sql, "WITH atts ("), 1);
    assert!(!sql.contains("abase"));
    assert!(sql.contains("SELECT M1.run_id, AVG(M1.attrIncome) AS calc_value\nFROM atts M1"));
    assert!(sql.contains("WHERE RE.run_id IN (219)\n"));
    // outer wrapper only
    assert_eq!(count(&sql, "GROUP BY"), 1);
}

#[test]
fn test_run_comparison() {
    let model = model();
    let sql = translate(
        &model,
        &read(),
        "OM_AVG(Income[variant] - (Pension[base] + Salary[base]))",
        &[],
        &[221, 222],
    )
    .unwrap();

    let abase = sql.find("WITH abase (").unwrap();
    let avar = sql.find("avar (run_id").unwrap();
    let abv = sql.find("abv (run_id").unwrap();
    assert!(abase < avar && avar < abv);

    assert!(sql.contains("WHERE RE.run_id = 219\n"));
    assert!(sql.contains("WHERE RE.run_id IN (221, 222)\n"));
    assert!(sql.contains("INNER JOIN avar V ON (V.entity_key = B.entity_key)\n"));
    assert!(sql.contains("FROM abv M1"));
    assert!(sql.contains("AVG(M1.attrIncome_var - (M1.attrPension_base + M1.attrSalary_base))"));
}

#[test]
fn test_nested_aggregate_levels() {
    let model = model();
    let sql = translate(
        &model,
        &read(),
        "OM_SUM(Income - 0.5 * OM_AVG(Pension))",
        &["Sex"],
        &[],
    )
    .unwrap();

    assert!(sql.contains("SELECT M2.run_id, M2.attrSex, AVG(M2.attrPension) AS ex1\nFROM atts M2"));
    assert!(sql.contains(
        "SELECT M1.run_id, M1.attrSex, SUM(M1.attrIncome - 0.5 * L1A1.ex1) AS calc_value"
    ));
    assert!(sql.contains(") L1A1 ON (L1A1.run_id = M1.run_id AND L1A1.attrSex = M1.attrSex)"));
    assert_eq!(count(&sql, "GROUP BY M"), 2);
}

#[test]
fn test_level_count() {
    let model = model();
    let cases = [
        ("OM_AVG(Income)", 1),
        ("OM_SUM(Income - OM_AVG(Income))", 2),
        ("OM_MAX(Income - OM_AVG(Salary - OM_MIN(Pension)))", 3),
        // variance mean is evaluated one level down
        ("OM_VAR(Income)", 2),
        ("OM_SD(Income - OM_AVG(Salary))", 3),
    ];
    for (expr, levels) in cases {
        let sql = translate(&model, &read(), expr, &[], &[]).unwrap();
        assert_eq!(count(&sql, "GROUP BY M"), levels, "{}", expr);
    }
}

#[test]
fn test_mixed_forms_rejected() {
    let model = model();
    for expr in [
        "OM_AVG(Income[base] - Income)",
        "OM_AVG(Income[variant] - Salary)",
        "OM_AVG(Income[variant] - OM_AVG(Income))",
    ] {
        let err = translate(&model, &read(), expr, &[], &[221]).unwrap_err();
        assert!(
            matches!(err.kind(), CalcError::MixedReferenceForms(_)),
            "{}: {}",
            expr,
            err
        );
    }
}

#[test]
fn test_unsafe_text_rejected() {
    let model = model();
    for expr in [
        "OM_AVG(Income); SELECT 1",
        "OM_AVG(Income) /* x */",
        "OM_AVG(Income)\n-- x",
        "OM_AVG(Income) + drop",
        "OM_AVG(Income) + 'open",
    ] {
        let err = translate(&model, &read(), expr, &[], &[]).unwrap_err();
        assert!(
            matches!(err.kind(), CalcError::UnsafeExpression(_)),
            "{}: {}",
            expr,
            err
        );
        assert_eq!(err.entity, "Person");
    }
}

#[test]
fn test_repeated_signs() {
    let model = model();
    let sql = translate(&model, &read(), "OM_AVG(- -Income)", &[], &[219]).unwrap();

    assert!(!sql.contains("--"), "{}", sql);
    assert!(sql.contains("SELECT M1.run_id, AVG(-(-M1.attrIncome)) AS calc_value\nFROM atts M1"));

    let sql = translate(&model, &read(), "OM_SUM(Income * - -1)", &[], &[]).unwrap();
    assert!(sql.contains("SUM(M1.attrIncome * -(-1)) AS calc_value"));
}

#[test]
fn test_deterministic_output() {
    let model = model();
    let expr = "OM_SUM(Salary * param.BaseSalary - OM_AVG(Pension * param.PensionRate))";
    let first = translate(&model, &read(), expr, &["AgeGroup", "Sex"], &[221]).unwrap();
    for _ in 0..5 {
        let again = translate(&model, &read(), expr, &["AgeGroup", "Sex"], &[221]).unwrap();
        assert_eq!(first, again);
    }
}

#[test]
fn test_parameter_ctes_and_joins() {
    let model = model();
    let sql = translate(
        &model,
        &read(),
        "OM_AVG(Salary * param.PensionRate + Pension * param.BaseSalary)",
        &[],
        &[],
    )
    .unwrap();

    // CTEs by parameter hid
    let p101 = sql.find(",\npar_101 (run_id, param_value) AS").unwrap();
    let p102 = sql.find(",\npar_102 (run_id, param_value) AS").unwrap();
    assert!(p101 < p102);
    // joins sorted by CTE name
    assert!(sql.contains(
        "FROM atts M1\nINNER JOIN par_101 ON (par_101.run_id = M1.run_id)\nINNER JOIN par_102 ON (par_102.run_id = M1.run_id)\n"
    ));
}

#[test]
fn test_comparison_parameters() {
    let model = model();
    let sql = translate(
        &model,
        &read(),
        "OM_AVG(Salary[variant] * param.BaseSalary[variant] - Salary[base] * param.BaseSalary[base])",
        &[],
        &[221],
    )
    .unwrap();

    assert!(sql.contains("pbase_101 (param_base) AS"));
    assert!(sql.contains("WHERE RP.run_id = 219 AND RP.parameter_hid = 101\n"));
    assert!(sql.contains("pvar_101 (run_id, param_var) AS"));
    assert!(sql.contains("CROSS JOIN pbase_101\nINNER JOIN pvar_101 ON (pvar_101.run_id = M1.run_id)"));
    assert!(sql.contains("M1.attrSalary_var * pvar_101.param_var - M1.attrSalary_base * pbase_101.param_base"));

    let err = translate(
        &model,
        &read(),
        "OM_AVG(Salary[variant] * param.BaseSalary - Salary[base])",
        &[],
        &[221],
    )
    .unwrap_err();
    assert!(matches!(err.kind(), CalcError::InvalidParameterForm(_)));
}

#[test]
fn test_filters() {
    let model = model();
    let layout = ReadLayout {
        from_id: FROM_ID,
        filter: vec![
            FilterColumn::new("Sex", FilterOp::InAuto, &["F", "M"]),
            FilterColumn::new("Age", FilterOp::Between, &["18", "64"]),
            FilterColumn::new("Calc", FilterOp::Gt, &["0"]),
        ],
        filter_by_id: vec![FilterIdColumn {
            name: "AgeGroup".to_string(),
            op: FilterOp::Ne,
            enum_ids: vec![30],
        }],
        order_by: vec![],
    };
    let sql = translate(&model, &layout, "OM_AVG(Income)", &["Sex"], &[]).unwrap();

    assert!(sql.contains(
        "WHERE RE.run_id IN (219)\nAND E.attrSex IN (0, 1)\nAND E.attrAge BETWEEN 18 AND 64\nAND E.attrAgeGroup <> 30\n)"
    ));
    assert!(sql.contains(") A\nWHERE A.calc_value > 0\nORDER BY 1, 2, 3"));
}

#[test]
fn test_comparison_filters_on_variant_runs() {
    let model = model();
    let layout = ReadLayout {
        from_id: FROM_ID,
        filter: vec![FilterColumn::new("IsAlive", FilterOp::Eq, &["true"])],
        ..Default::default()
    };
    let sql = translate(
        &model,
        &layout,
        "OM_AVG(Income[variant] - Income[base])",
        &[],
        &[221],
    )
    .unwrap();

    assert_eq!(count(&sql, "AND E.attrIsAlive = 1"), 1);
    assert!(sql.contains("WHERE RE.run_id IN (221)\nAND E.attrIsAlive = 1"));
}

#[test]
fn test_unknown_filter() {
    let model = model();
    let layout = ReadLayout {
        from_id: FROM_ID,
        filter: vec![FilterColumn::new("Region", FilterOp::Eq, &["1"])],
        ..Default::default()
    };
    let err = translate(&model, &layout, "OM_AVG(Income)", &[], &[]).unwrap_err();
    assert!(matches!(err.kind(), CalcError::UnknownAttribute(_)));
}

#[test]
fn test_explicit_order_by() {
    let model = model();
    let layout = ReadLayout {
        from_id: FROM_ID,
        order_by: vec![
            OrderByColumn {
                index_one: 4,
                is_desc: true,
            },
            OrderByColumn {
                index_one: 1,
                is_desc: false,
            },
        ],
        ..Default::default()
    };
    let sql = translate(&model, &layout, "OM_AVG(Income)", &["Sex"], &[]).unwrap();
    assert!(sql.ends_with("\nORDER BY 4 DESC, 1"));

    let layout = ReadLayout {
        from_id: FROM_ID,
        order_by: vec![OrderByColumn {
            index_one: 9,
            is_desc: false,
        }],
        ..Default::default()
    };
    let err = translate(&model, &layout, "OM_AVG(Income)", &["Sex"], &[]).unwrap_err();
    assert!(matches!(err.kind(), CalcError::InvalidOrderBy(_)));
}

#[test]
fn test_translate_options() {
    let model = model();
    let entity = model.entity_by_name("Person").unwrap();
    let generation = model.entity_gen(entity.entity_hid, Some("e5f6a7b8")).unwrap();
    let options = TranslateOptions {
        div_by_epsilon: 1.0e-9,
        run_entity_table: "om_run_entity".to_string(),
        run_parameter_table: "om_run_parameter".to_string(),
    };

    let sql = MicroTranslator::new(&model, entity, generation)
        .with_options(options)
        .translate(
            &read(),
            &calc("OM_SUM(Income) / OM_DIV_BY(OM_COUNT(Income))"),
            &[],
            &[],
        )
        .unwrap();

    assert!(sql.contains("FROM Person_g12e5f6a7b8 E\nINNER JOIN om_run_entity RE ON (RE.base_run_id = E.run_id AND RE.entity_gen_hid = 12)"));
    assert!(sql.contains("CASE WHEN ABS(COUNT(M1.attrIncome)) > 1e-9 THEN COUNT(M1.attrIncome) ELSE NULL END"));

    // Pension is not part of the second generation
    let err = MicroTranslator::new(&model, entity, generation)
        .translate(&read(), &calc("OM_AVG(Pension)"), &[], &[])
        .unwrap_err();
    assert!(matches!(err.kind(), CalcError::UnknownAttribute(_)));
}

#[test]
fn test_micro_calc_to_sql() {
    let model = model();
    let sql = micro_calc_to_sql(
        &model,
        "Person",
        None,
        &read(),
        &calc("OM_AVG(Income)"),
        &[],
        &[],
        &TranslateOptions::default(),
    )
    .unwrap();
    assert!(sql.contains("AVG(M1.attrIncome) AS calc_value"));

    let err = micro_calc_to_sql(
        &model,
        "Person",
        Some("no-such-digest"),
        &read(),
        &calc("OM_AVG(Income)"),
        &[],
        &[],
        &TranslateOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("Entity generation not found"));

    let err = micro_calc_to_sql(
        &model,
        "Person",
        None,
        &read(),
        &calc("OM_AVG(Wealth)"),
        &[],
        &[],
        &TranslateOptions::default(),
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("Entity attribute not found: Wealth"));
}

#[test]
fn test_concurrent_translations() {
    let model = model();
    let expected = translate(&model, &read(), "OM_AVG(Income - OM_AVG(Salary))", &["Sex"], &[]).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    translate(&model, &read(), "OM_AVG(Income - OM_AVG(Salary))", &["Sex"], &[])
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}
