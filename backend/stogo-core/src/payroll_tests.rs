// src/payroll_tests.rs

#[cfg(test)]
mod tests {
    use crate::config::PayrollConfig;
    use crate::incentives::{
        HourRange, IncentivePolicy, IncentiveRule, RateEntry, RateTable, ShiftType,
    };
    use crate::payroll::*;
    use crate::records::{columns, FieldValue, Row};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    // --- Helpers ---

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn create_test_timecard(
        guid: &str,
        employee_id: &str,
        hours: &str,
        lunch: &str,
        in_date: &str,
        in_time: &str,
        out_date: &str,
        out_time: &str,
    ) -> Row {
        row(&[
            (columns::EMPLOYEE_ID, employee_id),
            (columns::FIRST_NAME, "Jane"),
            (columns::LAST_NAME, "Doe"),
            (columns::IN_CLOCKING_GUID, guid),
            (columns::HOURS, hours),
            (columns::PAYCODE, "REG"),
            (columns::IN_CLOCKING_DATE, in_date),
            (columns::IN_CLOCKING_TIME, in_time),
            (columns::OUT_CLOCKING_DATE, out_date),
            (columns::OUT_CLOCKING_TIME, out_time),
            (columns::LUNCH_ANSWER, lunch),
            (columns::COMPANY, "100402"),
            (columns::COMPANY_DESCRIPTION, "Cedar Crest"),
            (columns::COST_CENTER, "0009343"),
            (columns::COST_CENTER_DESCRIPTION, "Nursing"),
        ])
    }

    fn create_test_config() -> PayrollConfig {
        PayrollConfig {
            lunch_deduction: dec!(0.5),
            rates: RateTable {
                day: RateEntry {
                    rate: dec!(58),
                    pay_code: "Day Rate".to_string(),
                },
                night: RateEntry {
                    rate: dec!(63),
                    pay_code: "Night Rate".to_string(),
                },
            },
            incentives: IncentivePolicy {
                enabled: true,
                expires_on: NaiveDate::from_ymd_opt(2025, 12, 31),
                rules: vec![IncentiveRule {
                    facility_code: "100402".to_string(),
                    cost_centers: vec!["9343".to_string()],
                    days: None,
                    shift_type: Some(ShiftType::Night),
                    hours: Some(HourRange { start: 19, end: 7 }),
                    amount: dec!(10),
                    description: "Cedar Crest night incentive".to_string(),
                }],
            },
            id_prefix: "BH".to_string(),
            approver: "ops@stogo.example".to_string(),
        }
    }

    fn create_test_inputs(timecards: Vec<Row>) -> PayrollInputs {
        PayrollInputs {
            timecards,
            crosswalk: vec![
                row(&[(columns::EEID, "N-1001"), (columns::EMPLOYEE_NUMBER, "BH2001")]),
                row(&[(columns::EEID, "N-1002"), (columns::EMPLOYEE_NUMBER, "BH2002")]),
            ],
            facilities: vec![row(&[(columns::STOGO_CODE, "100402"), (columns::TNAA, "TN-CC")])],
            shifts: vec![row(&[
                (columns::PERSON_ID, "BH2001"),
                (columns::PERSON_NAME, "Jane Doe"),
                (columns::START_DATE_TIME, "2025-10-17 19:00"),
                (columns::SHIFT_ID, "S-100"),
            ])],
            // Sunday that opens the selected week
            pay_period_start: NaiveDate::from_ymd_opt(2025, 10, 12).unwrap(),
        }
    }

    fn run(timecards: Vec<Row>) -> PayrollRun {
        PayrollTransformer::new(create_test_config()).run(&create_test_inputs(timecards))
    }

    // --- Pay Hours ---

    #[test]
    fn test_lunch_deduction_applied_when_affirmative() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "12.5", "Yes", "2025-10-13", "07:00", "2025-10-13", "19:30",
        )]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].pay_hours.to_string(), "12.00");
    }

    #[test]
    fn test_no_deduction_without_lunch_answer() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "12.5", "No", "2025-10-13", "07:00", "2025-10-13", "19:30",
        )]);
        assert_eq!(result.records[0].pay_hours.to_string(), "12.50");
    }

    #[test]
    fn test_pay_hours_formula_is_idempotent() {
        let first = pay_hours(dec!(12.5), true, dec!(0.5));
        let second = pay_hours(dec!(12.5), true, dec!(0.5));
        assert_eq!(first, second);
        assert_eq!(first, dec!(12.0));
        assert_eq!(pay_hours(dec!(8), false, dec!(0.5)), dec!(8));
    }

    #[test]
    fn test_negative_pay_hours_passed_through_and_reported() {
        let result = run(vec![create_test_timecard(
            "TC-NEG", "N-1001", "0.25", "Yes", "2025-10-13", "07:00", "2025-10-13", "07:15",
        )]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].pay_hours, dec!(-0.25));
        assert_eq!(result.summary.negative_pay_hours, vec!["TC-NEG".to_string()]);
    }

    #[test]
    fn test_unparseable_hours_dropped_and_counted() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "twelve", "No", "2025-10-13", "07:00", "2025-10-13", "19:00",
        )]);
        assert!(result.records.is_empty());
        assert_eq!(result.summary.unparseable_hours, 1);
    }

    // --- Resolution & Rating ---

    #[test]
    fn test_unresolved_employee_is_filtered_never_blank() {
        let result = run(vec![
            create_test_timecard(
                "TC-1", "N-9999", "8", "No", "2025-10-13", "07:00", "2025-10-13", "15:00",
            ),
            create_test_timecard(
                "TC-2", "N-1002", "8", "No", "2025-10-13", "07:00", "2025-10-13", "15:00",
            ),
        ]);
        assert_eq!(result.summary.unresolved_employee, 1);
        assert_eq!(result.records.len(), 1);
        assert!(result.records.iter().all(|r| !r.stogo_eid.is_empty()));
        assert_eq!(result.records[0].stogo_eid, "2002");
    }

    #[test]
    fn test_night_shift_classified_by_date_change() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1002", "12", "No", "2025-10-13", "19:00", "2025-10-14", "07:00",
        )]);
        assert_eq!(result.records[0].pay_code, "Night Rate");
    }

    #[test]
    fn test_cedar_crest_night_incentive() {
        // Friday 19:00 to Saturday 07:00
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "12", "No", "10/17/25", "7:00 PM", "10/18/25", "7:00 AM",
        )]);
        let record = &result.records[0];
        assert_eq!(record.pay_code, "Night Rate");
        assert_eq!(record.pay_rate.to_string(), "73.00");
        assert!(record.has_incentive);
        assert_eq!(record.incentive_description, "Cedar Crest night incentive");
        assert_eq!(result.summary.incentives_applied, 1);
    }

    #[test]
    fn test_day_shift_keeps_base_rate() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "8", "No", "2025-10-14", "08:00", "2025-10-14", "16:00",
        )]);
        let record = &result.records[0];
        assert_eq!(record.pay_code, "Day Rate");
        assert_eq!(record.pay_rate, dec!(58));
        assert!(!record.has_incentive);
    }

    #[test]
    fn test_shift_lookup_and_facility_resolution() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "12", "No", "2025-10-17", "19:00", "2025-10-18", "07:00",
        )]);
        let record = &result.records[0];
        assert_eq!(record.lookup_shift_id, "S-100");
        assert_eq!(record.lookup_person_name, "Jane Doe");
        assert_eq!(record.lookup_tnaa, "TN-CC");
        assert_eq!(result.summary.unmatched_shifts, 0);
    }

    #[test]
    fn test_missing_shift_and_facility_fallback_still_emit() {
        let mut timecard = create_test_timecard(
            "TC-1", "N-1001", "8", "No", "2025-10-14", "08:00", "2025-10-14", "16:00",
        );
        timecard.insert(columns::COMPANY.to_string(), FieldValue::text("555"));

        let result = run(vec![timecard]);
        let record = &result.records[0];
        assert_eq!(record.lookup_shift_id, "");
        assert_eq!(record.lookup_person_name, "");
        assert_eq!(record.lookup_tnaa, "555");
        assert_eq!(record.employee_name, "Jane Doe");
        assert_eq!(result.summary.unmatched_shifts, 1);
        assert_eq!(result.summary.facility_fallbacks, 1);
    }

    // --- Assembly ---

    #[test]
    fn test_output_formatting() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "12", "No", "45943", "0.2916666667", "45943", "0.7916666667",
        )]);
        let record = &result.records[0];
        assert_eq!(record.stogo_eid, "2001");
        assert_eq!(record.cost_center, "9343");
        assert_eq!(record.in_date, "10/13/25");
        assert_eq!(record.in_time, "07:00");
        assert_eq!(record.out_time, "19:00");
        assert_eq!(record.approver, "ops@stogo.example");
        assert_eq!(record.blank, "");
        assert_eq!(record.meta_info, "");
        assert!(!record.is_outside_pay_period);
        assert_eq!(record.adjusted_start, "");
    }

    #[test]
    fn test_off_pay_period_flag_and_adjusted_week() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "8", "No", "2025-10-06", "08:00", "2025-10-06", "16:00",
        )]);
        let record = &result.records[0];
        assert!(record.is_outside_pay_period);
        assert_eq!(record.adjusted_start, "10/5/25");
        assert_eq!(record.adjusted_end, "10/11/25");
        assert_eq!(result.summary.outside_pay_period, 1);
    }

    #[test]
    fn test_unrecognized_dates_pass_through() {
        let result = run(vec![create_test_timecard(
            "TC-1", "N-1001", "8", "No", "sometime", "08:00", "sometime", "16:00",
        )]);
        let record = &result.records[0];
        assert_eq!(record.in_date, "sometime");
        assert!(!record.is_outside_pay_period);
    }

    #[test]
    fn test_export_row_follows_column_order() {
        let result = run(vec![create_test_timecard(
            "TC-7", "N-1001", "12", "No", "2025-10-17", "19:00", "2025-10-18", "07:00",
        )]);
        let exported = result.records[0].export_row();
        assert_eq!(exported.len(), PAYROLL_COLUMNS.len());
        assert_eq!(exported[0], "2001");
        assert_eq!(exported[2], "12.00");
        assert_eq!(exported[3], "73.00");
        assert_eq!(exported[5], "TN-CC");
        assert_eq!(exported[8], "TC-7");
        assert_eq!(exported[19], "9343");
    }

    #[test]
    fn test_record_rebuilt_from_exported_row() {
        let result = run(vec![create_test_timecard(
            "TC-7", "N-1001", "12", "No", "2025-10-17", "19:00", "2025-10-18", "07:00",
        )]);
        let original = &result.records[0];
        let exported: Row = PAYROLL_COLUMNS
            .iter()
            .zip(original.export_row())
            .map(|(column, value)| (column.to_string(), FieldValue::from(value.as_str())))
            .collect();

        let rebuilt = PayrollOutputRecord::from_row(&exported);
        assert_eq!(rebuilt.pay_hours, dec!(12));
        assert_eq!(rebuilt.pay_rate, dec!(73));
        assert_eq!(rebuilt.lookup_person_name, "Jane Doe");
        assert_eq!(rebuilt.timecard_id, "TC-7");
    }

    #[test]
    fn test_full_records_keep_incentive_flags() {
        let result = run(vec![create_test_timecard(
            "TC-7", "N-1001", "12", "No", "2025-10-17", "19:00", "2025-10-18", "07:00",
        )]);
        let json = serde_json::to_string(&result.records).unwrap();
        let reloaded: Vec<PayrollOutputRecord> = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded, result.records);
        assert!(reloaded[0].has_incentive);
        assert_eq!(reloaded[0].employee_name, "Jane Doe");
        assert_eq!(reloaded[0].incentive_description, "Cedar Crest night incentive");
    }

    #[test]
    fn test_internal_id_that_is_only_the_prefix_is_unresolved() {
        let mut inputs = create_test_inputs(vec![create_test_timecard(
            "TC-1", "N-3003", "8", "No", "2025-10-13", "07:00", "2025-10-13", "15:00",
        )]);
        inputs
            .crosswalk
            .push(row(&[(columns::EEID, "N-3003"), (columns::EMPLOYEE_NUMBER, "BH")]));

        let result = PayrollTransformer::new(create_test_config()).run(&inputs);
        assert!(result.records.is_empty());
        assert_eq!(result.summary.unresolved_employee, 1);
    }

    #[test]
    fn test_summary_counts() {
        let result = run(vec![
            create_test_timecard(
                "TC-1", "N-1001", "12.5", "Yes", "2025-10-13", "07:00", "2025-10-13", "19:30",
            ),
            create_test_timecard(
                "TC-2", "N-1001", "12", "No", "2025-10-17", "19:00", "2025-10-18", "07:00",
            ),
            create_test_timecard(
                "TC-3", "N-9999", "8", "No", "2025-10-13", "07:00", "2025-10-13", "15:00",
            ),
            create_test_timecard(
                "TC-4", "N-1002", "abc", "No", "2025-10-13", "07:00", "2025-10-13", "15:00",
            ),
            create_test_timecard(
                "TC-5", "N-1002", "0.25", "Yes", "2025-10-13", "07:00", "2025-10-13", "07:15",
            ),
            create_test_timecard(
                "TC-6", "N-1002", "8", "No", "2025-10-06", "07:00", "2025-10-06", "15:00",
            ),
        ]);
        let summary = &result.summary;
        assert_eq!(summary.input_rows, 6);
        assert_eq!(summary.emitted, 4);
        assert_eq!(summary.unresolved_employee, 1);
        assert_eq!(summary.unparseable_hours, 1);
        assert_eq!(summary.negative_pay_hours, vec!["TC-5".to_string()]);
        assert_eq!(summary.unmatched_shifts, 3);
        assert_eq!(summary.facility_fallbacks, 0);
        assert_eq!(summary.incentives_applied, 1);
        assert_eq!(summary.outside_pay_period, 1);
    }
}
