//! GraphQL query text sent to the forge. Kept as plain constants (rather than a
//! schema-derived query builder) so the shape of each response can be modeled with a small,
//! purpose-built `serde` struct next to the query that produces it.

pub const PR_REVIEWS_FRAGMENT: &str = r#"
fragment PRReviews on PullRequestReviewConnection {
  nodes {
    author { login }
    state
  }
  pageInfo {
    startCursor
    hasPreviousPage
  }
}
"#;

pub const CHECKSUITES_FRAGMENT: &str = r#"
fragment PRCheckSuites on CheckSuiteConnection {
  edges {
    node {
      workflowRun {
        workflow { name }
        url
      }
      checkRuns(first: 50) {
        nodes {
          name
          conclusion
          detailsUrl
        }
        pageInfo {
          endCursor
          hasNextPage
        }
      }
      conclusion
    }
    cursor
  }
  pageInfo {
    hasNextPage
  }
}
"#;

pub const COMMIT_AUTHORS_FRAGMENT: &str = r#"
fragment CommitAuthors on PullRequestCommitConnection {
  nodes {
    commit {
      author {
        user { login }
        email
        name
      }
      oid
    }
  }
  pageInfo {
    endCursor
    hasNextPage
  }
}
"#;

pub fn pr_info_query() -> String {
    format!(
        "{}{}{}{}",
        PR_REVIEWS_FRAGMENT,
        CHECKSUITES_FRAGMENT,
        COMMIT_AUTHORS_FRAGMENT,
        r#"
query ($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      closed
      isCrossRepository
      author { login }
      title
      body
      headRefName
      baseRefName
      baseRepository {
        isPrivate
        defaultBranchRef { name }
      }
      mergeCommit { oid }
      commits_with_authors: commits(first: 100) {
        ...CommitAuthors
        totalCount
      }
      commits(last: 1) {
        nodes {
          commit {
            checkSuites(first: 10) { ...PRCheckSuites }
            status {
              contexts { context state targetUrl }
            }
            pushedDate
            oid
          }
        }
      }
      changedFiles
      files(first: 100) {
        nodes { path }
        pageInfo { endCursor hasNextPage }
      }
      reviews(last: 100) { ...PRReviews }
      comments(last: 5) {
        nodes {
          bodyText
          createdAt
          author { login }
          authorAssociation
          editor { login }
          databaseId
        }
        pageInfo { startCursor hasPreviousPage }
      }
      labels(first: 100) {
        edges { node { name } }
      }
      headRef {
        compare(headRef: "master") {
          commits(first: 1) {
            edges {
              node {
                parents(first: 1) {
                  edges { node { oid } }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#
    )
}

pub const PR_NEXT_FILES_QUERY: &str = r#"
query ($owner: String!, $name: String!, $number: Int!, $cursor: String!) {
  repository(name: $name, owner: $owner) {
    pullRequest(number: $number) {
      files(first: 100, after: $cursor) {
        nodes { path }
        pageInfo { endCursor hasNextPage }
      }
    }
  }
}
"#;

pub fn pr_next_checksuites_query() -> String {
    format!(
        "{}{}",
        CHECKSUITES_FRAGMENT,
        r#"
query ($owner: String!, $name: String!, $number: Int!, $cursor: String!) {
  repository(name: $name, owner: $owner) {
    pullRequest(number: $number) {
      commits(last: 1) {
        nodes {
          commit {
            oid
            checkSuites(first: 10, after: $cursor) { ...PRCheckSuites }
          }
        }
      }
    }
  }
}
"#
    )
}

pub fn commit_checksuites_query() -> String {
    format!(
        "{}{}",
        CHECKSUITES_FRAGMENT,
        r#"
query ($owner: String!, $name: String!, $commit: String) {
  repository(name: $name, owner: $owner) {
    object(expression: $commit) {
      ... on Commit {
        checkSuites(first: 10) { ...PRCheckSuites }
      }
    }
  }
}
"#
    )
}

pub fn commit_next_checksuites_query() -> String {
    format!(
        "{}{}",
        CHECKSUITES_FRAGMENT,
        r#"
query ($owner: String!, $name: String!, $commit: String, $cursor: String!) {
  repository(name: $name, owner: $owner) {
    object(expression: $commit) {
      ... on Commit {
        oid
        checkSuites(first: 10, after: $cursor) { ...PRCheckSuites }
      }
    }
  }
}
"#
    )
}

pub const COMMIT_NEXT_CHECK_RUNS_QUERY: &str = r#"
query ($owner: String!, $name: String!, $cs_cursor: String, $cr_cursor: String!, $commit: String) {
  repository(name: $name, owner: $owner) {
    object(expression: $commit) {
      ... on Commit {
        checkSuites(first: 1, after: $cs_cursor) {
          nodes {
            checkRuns(first: 100, after: $cr_cursor) {
              nodes { name conclusion detailsUrl }
              pageInfo { endCursor hasNextPage }
            }
          }
        }
      }
    }
  }
}
"#;

pub const PR_NEXT_CHECK_RUNS_QUERY: &str = r#"
query ($owner: String!, $name: String!, $number: Int!, $cs_cursor: String, $cr_cursor: String!) {
  repository(name: $name, owner: $owner) {
    pullRequest(number: $number) {
      commits(last: 1) {
        nodes {
          commit {
            oid
            checkSuites(first: 1, after: $cs_cursor) {
              nodes {
                checkRuns(first: 100, after: $cr_cursor) {
                  nodes { name conclusion detailsUrl }
                  pageInfo { endCursor hasNextPage }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

pub const PR_PREV_COMMENTS_QUERY: &str = r#"
query ($owner: String!, $name: String!, $number: Int!, $cursor: String!) {
  repository(name: $name, owner: $owner) {
    pullRequest(number: $number) {
      comments(last: 100, before: $cursor) {
        nodes {
          bodyText
          createdAt
          author { login }
          authorAssociation
          editor { login }
          databaseId
        }
        pageInfo { startCursor hasPreviousPage }
      }
    }
  }
}
"#;

pub const TEAM_MEMBERS_QUERY: &str = r#"
query ($org: String!, $name: String!, $cursor: String) {
  organization(login: $org) {
    team(slug: $name) {
      members(first: 100, after: $cursor) {
        nodes { login }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}
"#;

pub fn pr_next_authors_query() -> String {
    format!(
        "{}{}",
        COMMIT_AUTHORS_FRAGMENT,
        r#"
query ($owner: String!, $name: String!, $number: Int!, $cursor: String) {
  repository(name: $name, owner: $owner) {
    pullRequest(number: $number) {
      commits_with_authors: commits(first: 100, after: $cursor) { ...CommitAuthors }
    }
  }
}
"#
    )
}

pub fn pr_prev_reviews_query() -> String {
    format!(
        "{}{}",
        PR_REVIEWS_FRAGMENT,
        r#"
query ($owner: String!, $name: String!, $number: Int!, $cursor: String!) {
  repository(name: $name, owner: $owner) {
    pullRequest(number: $number) {
      reviews(last: 100, before: $cursor) { ...PRReviews }
    }
  }
}
"#
    )
}
