/*!

This is the long-form manual for `rar_form` and the `rarform` program.

## The application form

The form is filled in over six steps. An applicant can only leave a step once every
question of the step is answered correctly; going back is always possible and never
loses an answer.

| Step | Title | Questions |
|------|-------|-----------|
| 1 | Your Details | `Full_Name`, `CA_Email`, `Contact_Email`, `Contact_Number`, `Preferred_Contact_Method` |
| 2 | Your Device | `Reason_for_BYOD`, `Device_Type`, `Device_Count`, `Device_Model_Name`, `OS_and_Version`, `Web_Browser_and_Version` |
| 3 | Software Setup | `Malware_Protection_Software`, `Email_Client_Used`, `Office_Apps_Used` |
| 4 | Security Measures | the fourteen Yes/No assurances |
| 5 | Final Thoughts & Consent | `Personalised_Help`, `Comments_Feedback` and the three acknowledgements |
| 6 | Verification | the human verification check |

Notes:
- one application covers one device: a `Device_Count` above 1 stops step 2 until it is
  set back to 1.
- `Separate_User_Account_Assurance` is only asked for computers. For any other device
  it is recorded as `N/A`.
- the three acknowledgements must be ticked again after a reload: they are never kept
  in a draft.

Once submitted, the answers are checked by reCAPTCHA, then stored in the response sheet
and emailed to the applicant (at `CA_Email`, or `Contact_Email` when there is none) and
to the IT manager.

## The response sheet

The sheet has one header row followed by one row per submission. Rows are written by
position, in the order of [crate::HEADERS]: a sheet whose header row was edited by hand
will silently receive values in the wrong columns. Check it with `verify-headers`.

Every row carries a `Submission_ID` of the form `YYYYMMDD-HHMMSS-NNN`, built from the
submission time (UTC) and a random three-digit suffix.

## The `rarform` program

```text
rarform [--config FILE] [--sheet FILE] [--verbose] COMMAND
```

### `setup-headers`

Creates the sheet if it does not exist and writes the expected column names into the
empty cells of the header row. Cells that already hold a name are never changed, so it
can be run at any time.

### `verify-headers`

Compares the header row with the expected columns and lists every position where they
diverge, with its spreadsheet column letter. Excel exports (`.xlsx`) can be checked too:
pass `--worksheet` if the worksheet is not named `RARresponses`. With `--diff`, a line
diff of both header rows is also printed. Exits with an error when a mismatch is found.

### `backfill-ids`

Gives an identifier to every row that has an empty `Submission_ID`, derived from its
`Submission_Timestamp_ISO`. Rows without a readable timestamp are left alone and
reported. Running it twice does nothing the second time.

### `append`

Stores one submission received as a JSON object keyed by column name (from `--input`
or the standard input) and replies on the standard output with:

```json
{"status": "success", "message": "Data saved and emails sent.", "submissionId": "20240305-101530-042"}
```

or `{"status": "error", "message": "..."}`. Only one submission is stored at a time: if
the sheet stays busy for longer than `lockTimeoutSeconds`, the submission is refused
with an error reply.

### `submit` and `clear-draft`

`submit --answers answers.json --token TOKEN` fills in the form from a JSON object
keyed by column name and walks it through every step. Whatever stops it is printed and
the answers are kept as a draft, merged with the next attempt. `--fresh` discards the
draft first; `clear-draft` only discards it.

## Configuration

All the keys are optional:

```json
{
  "sheetPath": "RARresponses.csv",
  "sheetName": "RARresponses",
  "outboxDirectory": "outbox",
  "stateDirectory": ".rarform",
  "itManagerEmail": "it-manager@example.com",
  "organisation": "LCA Teignbridge",
  "lockTimeoutSeconds": 30,
  "relayUrl": null,
  "recaptcha": {"secret": null, "threshold": 0.5},
  "ipLookupUrl": "https://api.ipify.org?format=json",
  "httpTimeoutSeconds": 10
}
```

- Emails are written as `.eml` files in `outboxDirectory`.
- When `relayUrl` is set, `submit` posts the answers to that URL (which must speak the
  `append` protocol above) instead of storing them locally.
- Without a reCAPTCHA secret, every submission fails verification. The environment
  variables `RAR_RECAPTCHA_SECRET` and `RAR_RELAY_URL` override the file.
- Logging follows `RUST_LOG`; `--verbose` turns on debug output.

*/
